pub mod codec;
pub mod template;

pub use codec::{
    CodecError, DEFAULT_DATA_TEMPLATE, DEFAULT_RESIZE_TEMPLATE, DEFAULT_UPLOAD_TEMPLATE,
    MessageCodec,
};
pub use template::{Escape, Template, TemplateError, Value};
