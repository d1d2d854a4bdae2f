//! Unit tests for the SOAP API layer.

mod envelope;
