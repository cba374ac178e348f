pub mod identity_list;
pub mod resolver;
