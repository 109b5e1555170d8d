pub mod actor;

pub use actor::{ActorContext, Role, USER_ID_HEADER, USER_ROLE_HEADER};
