pub mod config;
pub mod error;
pub mod handler;
pub mod mqtt;
pub mod record;
pub mod storage;
pub mod transform;

#[cfg(test)]
mod test_support;
