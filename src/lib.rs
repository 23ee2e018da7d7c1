pub mod catalog;
pub mod cli;
pub mod config;
pub mod metric;
pub mod model;
pub mod producer;
pub mod retriever;
pub mod util;
pub mod validator;
