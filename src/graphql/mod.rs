pub mod mutation;
pub mod query;
pub mod schema;
pub mod types;

pub use mutation::*;
pub use query::*;
pub use schema::*;
pub use types::*;

use async_graphql::{Context, Error, ErrorExtensions};

use crate::error::RbacError;
use crate::services::history::DEFAULT_ACTOR;

/// Who a mutation is attributed to in the permission history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor(pub String);

impl Default for Actor {
    fn default() -> Self {
        Actor(DEFAULT_ACTOR.to_string())
    }
}

/// Actor attached to the request, `system` when none was supplied.
pub(crate) fn actor<'a>(ctx: &'a Context<'_>) -> &'a str {
    ctx.data_opt::<Actor>()
        .map(|actor| actor.0.as_str())
        .unwrap_or(DEFAULT_ACTOR)
}

impl ErrorExtensions for RbacError {
    fn extend(&self) -> Error {
        Error::new(self.to_string()).extend_with(|_, e| e.set("code", self.code()))
    }
}
