pub mod client;
pub mod encoder;
pub mod engine;
pub mod export;
pub mod request;
pub mod response;
pub mod session;

pub use client::{GeminiClient, GeminiConfig, GenerationTransport, RawResponse};
pub use encoder::{encode_image, ImageFile};
pub use engine::{spawn_generate, MockupEngine};
pub use export::{export_mockup, ExportContext, ExportedMockup};
pub use request::{build_request, GenerationOptions, GenerationRequest, ResponseModality};
pub use response::parse_response;
pub use session::{
    GenerationStateMachine, SessionInputs, SessionSnapshot, SessionState, SessionTicket, Transition,
};
