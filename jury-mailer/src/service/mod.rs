//! Dispatch layer

pub mod email;

pub use email::{
    resolve_credentials, select_transport, subject_for, DefaultTransportFactory, EmailDispatcher,
    TransportFactory,
};
