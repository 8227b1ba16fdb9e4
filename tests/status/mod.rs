//! Status aggregation tests.
