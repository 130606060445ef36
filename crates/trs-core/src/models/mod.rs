//! Data models for TRS entities.
//!
//! - `UserProfile`: the authenticated user snapshot, with `Role` and `Department`
//! - `LoginRequest` / `LoginResponse`: the credential exchange
//! - `RegistrationRequest`: new student sign-up

pub mod user;

pub use user::{
    Department, LoginRequest, LoginResponse, RegistrationRequest, Role, RoleType,
    StudentDetails, UserProfile,
};
