// 报文格式参考资料(相关 RFC ):
// ICMPv4: https://www.rfc-editor.org/pdfrfc/rfc792.txt.pdf
// Checksum: https://www.rfc-editor.org/pdfrfc/rfc1071.txt.pdf

mod checksum;
mod error;
mod header;
mod packet;

pub use checksum::{checksum, internet_checksum};
pub use error::{DecodeError, DecodeResult};
pub use header::{derive_code, Code, Header, MessageType};
pub use packet::{ChecksumPolicy, Packet};

pub const HEADER_SIZE: usize = 8;
