//! Command test suite
