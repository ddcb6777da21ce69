//! Identity: who the user is and whether their email is verified.

pub mod gateway;
pub mod memory;

pub use gateway::{IdentityGateway, User};
pub use memory::InMemoryIdentity;
