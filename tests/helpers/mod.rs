//! Shared fixtures for integration tests: a toy parse tree and an
//! extractor registration over it.

#![allow(dead_code)]

pub mod toy_tree;
