#![deny(warnings)]
#![deny(clippy::all)]

pub mod edit_list;
pub mod header;
pub mod packet;
pub mod reader;
pub mod recrypt;
pub mod rewrap;
pub mod session;
pub mod validate;
pub mod writer;

pub use edit_list::EditListWriter;
pub use header::{
    encode_header, encode_packets, parse_header, FormatError, Header, HeaderPacket, MAGIC,
    PACKET_PREFIX_LEN, PREAMBLE_LEN, VERSION,
};
pub use packet::{PacketContent, PacketPayload, PACKET_TYPE_DATA_ENC, PACKET_TYPE_EDIT_LIST};
pub use reader::{
    decrypt, decrypt_detached, read_header, save_header, save_header_and_payload,
    DecryptedContainer, PayloadHeaderPolicy,
};
pub use recrypt::{recrypt, recrypt_header};
pub use rewrap::{
    open_packet, open_packet_as, wrap_payload, AttemptFailure, DecryptionKey, PacketRejection,
    RecipientKey,
};
pub use session::{collect_session, summarize, PacketSummary, Session};
pub use writer::{build_header, encrypt, write_header, EncryptedContainer};
