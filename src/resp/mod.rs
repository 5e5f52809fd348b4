mod codec;
mod value;

pub use codec::{decode_command, DecodedCommand};
pub use value::{encode_command, RespValue};
