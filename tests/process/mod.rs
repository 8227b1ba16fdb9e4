//! Real-process tests. These spawn `/bin/sh` and only run on Unix.

#[cfg(unix)]
mod group_test;
