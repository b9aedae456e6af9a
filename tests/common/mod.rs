#![allow(dead_code)]

#[macro_use]
pub(crate) mod test_utils;
