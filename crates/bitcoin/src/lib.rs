pub mod decoder;
pub mod deriver;
pub mod rpc;
pub mod source;

pub use decoder::{ReceivedPayment, decode_receive};
pub use deriver::{AddressDeriver, parse_network};
pub use rpc::NodeClient;
pub use source::{PaymentBatch, PaymentSource};
