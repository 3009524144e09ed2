//! Generated protobuf types and service traits for `proto.rpc.v1`

tonic::include_proto!("proto.rpc.v1");
