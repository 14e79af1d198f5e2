pub mod lexer;
pub mod link;
pub mod normalize;
pub mod resolve;

pub use link::{describe_modules, link, module_key, ComponentDescriptor};
pub use normalize::{erase_types, normalize, normalize_with, Normalized, NormalizeOptions, Rule, RuleSet, DEFAULT_EXPORT_IDENT};
pub use resolve::resolve_component_name;
