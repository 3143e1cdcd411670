//! Shared harness for the end-to-end suites: one PostgreSQL container per
//! test binary, a schema per test, and a mocked CDR API.

pub mod harness;
