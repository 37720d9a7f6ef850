//! # Built-in Interceptors
//!
//! Ready-made [`Interceptor`](crate::registry::Interceptor)s for the usual
//! cross-cutting concerns. None are registered automatically; the embedding
//! application picks the ones it wants and decides where they run.
//!
//! | Interceptor | Stage | Effect |
//! |---|---|---|
//! | [`RequireMasterKey`] | BEFORE_EXEC | Forbidden unless a valid master key is presented |
//! | [`Authorization`] | BEFORE_EXEC | master key or a granted user, recorded in the scope |
//! | [`InputFieldValidator`] | BEFORE_EXEC | required/forbidden body fields from extras |
//! | [`PathValidator`] | BEFORE_EXEC | BadRequest for paths outside the allowed templates |
//! | [`FieldFilter`] | AFTER_EXEC | strips configured fields from response bodies |
//! | [`Expander`] | AFTER_EXEC | replaces references named in `?expand=` with the objects they point to |
//! | [`MethodNotAllowed`] | BEFORE_EXEC | 405 for every matching request |
//! | [`NotFound`] | BEFORE_EXEC | 404 for every matching request |

mod auth;
mod expand;
mod fields;
mod master_key;
mod path;
mod reject;

pub use auth::{Authorization, GRANTED_BY_KEY_SCOPE_KEY, USER_SCOPE_KEY};
pub use expand::{Expander, CLASS_FIELD, EXPAND_PARAMETER, REFERENCE_TYPE, TYPE_FIELD};
pub use fields::{FieldFilter, InputFieldValidator};
pub use master_key::RequireMasterKey;
pub use path::PathValidator;
pub use reject::{MethodNotAllowed, NotFound};
