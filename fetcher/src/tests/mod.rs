pub mod fixtures;

pub mod batch_tests;
