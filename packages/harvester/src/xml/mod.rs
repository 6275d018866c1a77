//! XML utilities: `roxmltree` node helpers and the owned element tree the
//! CFDI normalizer reads from.

mod tree;
mod utils;

pub use tree::{Element, OneOrMany};
pub use utils::{element_children, get_tag_name, get_text, strip_bom};
