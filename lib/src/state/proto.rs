// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Protocol buffer types and client for the `ycsync.state.v1` package.
//!
//! Kept in sync with `lib/proto/state.proto` by hand, so building the crate
//! does not need `protoc`.

use std::collections::HashMap;
use tonic::codegen::http;
use tonic::transport::Channel;

pub const SERVICE_NAME: &str = "ycsync.state.v1.StateService";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllRequest {
    #[prost(string, tag = "1")]
    pub table_name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllResponse {
    #[prost(map = "string, string", tag = "1")]
    pub entries: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PutRequest {
    #[prost(string, tag = "1")]
    pub table_name: ::prost::alloc::string::String,
    #[prost(map = "string, string", tag = "2")]
    pub entries: HashMap<String, String>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct PutResponse {}

/// Client for `ycsync.state.v1.StateService`.
#[derive(Debug, Clone)]
pub struct StateServiceClient {
    inner: tonic::client::Grpc<Channel>,
}

impl StateServiceClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Limits the maximum size of a decoded message.
    #[must_use]
    pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
        self.inner = self.inner.max_decoding_message_size(limit);
        self
    }

    /// Limits the maximum size of an encoded message.
    #[must_use]
    pub fn max_encoding_message_size(mut self, limit: usize) -> Self {
        self.inner = self.inner.max_encoding_message_size(limit);
        self
    }

    pub async fn get_all(
        &mut self,
        request: impl tonic::IntoRequest<GetAllRequest>,
    ) -> Result<tonic::Response<GetAllResponse>, tonic::Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("Service was not ready: {e}")))?;
        let codec = tonic::codec::ProstCodec::default();
        let path =
            http::uri::PathAndQuery::from_static("/ycsync.state.v1.StateService/GetAll");
        let mut req = request.into_request();
        req.extensions_mut()
            .insert(tonic::GrpcMethod::new(SERVICE_NAME, "GetAll"));
        self.inner.unary(req, path, codec).await
    }

    pub async fn put(
        &mut self,
        request: impl tonic::IntoRequest<PutRequest>,
    ) -> Result<tonic::Response<PutResponse>, tonic::Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("Service was not ready: {e}")))?;
        let codec = tonic::codec::ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static("/ycsync.state.v1.StateService/Put");
        let mut req = request.into_request();
        req.extensions_mut()
            .insert(tonic::GrpcMethod::new(SERVICE_NAME, "Put"));
        self.inner.unary(req, path, codec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_put_request_wire_format() {
        let mut entries = HashMap::new();
        entries.insert("t".to_string(), "c".to_string());
        let req = PutRequest {
            table_name: "bm".to_string(),
            entries,
        };

        let bytes = req.encode_to_vec();
        // field 1 (table_name), length-delimited
        assert_eq!(&bytes[..4], &[0x0a, 0x02, b'b', b'm']);
        assert_eq!(PutRequest::decode(bytes.as_slice()).unwrap(), req);
    }
}
