fn main() -> Result<(), Box<dyn std::error::Error>> {
    let fds = protox::compile(&["proto/gnmi.proto", "proto/o1t.proto"], &["proto/"])?;
    let bytes = protox::prost::Message::encode_to_vec(&fds);
    let fds: prost_types::FileDescriptorSet = prost::Message::decode(bytes.as_slice())?;
    tonic_build::configure().compile_fds(fds)?;
    Ok(())
}
