//! Test suites for the sift worker daemon.

pub(crate) mod support;
