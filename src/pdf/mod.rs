//! PDF object model consumed from the document loader

mod dict;
mod object;

pub use dict::{Dictionary, Value};
pub use object::ObjectRef;
