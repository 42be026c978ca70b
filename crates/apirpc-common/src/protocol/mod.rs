pub mod encoder;
pub mod error;
pub mod message;
pub mod requests;
pub mod responses;


pub use encoder::{convert_result, Encoder, JsonEncoder};
pub use error::{ApiRpcError, Result, INTERNAL_ERROR, NOT_FOUND, UNAUTHORIZED};
pub use message::{Message, Sequence};
pub use requests::{ActionName, ApiArgs, ApiRequest};
pub use responses::{ApiReply, ApiResult};
