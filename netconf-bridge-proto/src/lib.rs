//! Generated protobuf bindings for the NETCONF bridge.
//!
//! - [`gnmi`] - southbound gNMI Get/Set client
//! - [`o1t`] - northbound administrative `NetconfSessions` service

// Include the generated protobuf code
#[allow(clippy::doc_lazy_continuation)]
pub mod gnmi {
    tonic::include_proto!("gnmi");
}

#[allow(clippy::doc_lazy_continuation)]
pub mod o1t {
    tonic::include_proto!("o1t");
}
