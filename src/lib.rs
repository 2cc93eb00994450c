pub mod config;
pub mod entities;
pub mod error;
pub mod graphql;
pub mod services;

#[cfg(test)]
mod test_support;
