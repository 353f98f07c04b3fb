pub mod apply;
pub mod assign;
pub mod assignments;
pub mod attach;
pub mod capture;
pub mod common;
pub mod down;
pub mod layout;
pub mod reconcile;
pub mod release;
pub mod sessions;
