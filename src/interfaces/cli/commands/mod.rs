mod config_gen;
mod delete;
mod links;
mod status;

pub use config_gen::config_generate;
pub use delete::delete_links;
pub use links::{add_links, get_link, list_links, print_key};
pub use status::status;
