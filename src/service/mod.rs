//! Request pipeline shared by every resource.

mod crud;
pub mod normalize;
pub mod validation;

pub use crud::CrudService;
pub use validation::{RequestValidator, Violation, ViolationPath};
