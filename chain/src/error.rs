// Copyright 2023-2024 Genesis DAO Foundation
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
// You may obtain a copy of the License at the root of this project source code

//! Chain client error taxonomy.

/// Network faults the retry harness recognizes as recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
	ConnectionClosed,
	ConnectionRefused,
	BrokenPipe,
}

impl TransientKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			TransientKind::ConnectionClosed => "Connection closed",
			TransientKind::ConnectionRefused => "Connection refused",
			TransientKind::BrokenPipe => "Broken pipe",
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
	/// Transport or call failure reported by the RPC layer.
	#[error("rpc failure: {0}")]
	Rpc(#[from] jsonrpsee::core::Error),
	/// The node answered with no data where some was required. Hard error,
	/// distinct from a transient transport fault.
	#[error("node returned no data for {0}")]
	EmptyResponse(&'static str),
	#[error("failed decoding rpc response: {0}")]
	Decode(#[from] serde_json::Error),
}

impl ChainError {
	/// The recognized transient fault behind this error, if any.
	pub fn transient_kind(&self) -> Option<TransientKind> {
		let ChainError::Rpc(rpc) = self else { return None };
		match rpc {
			jsonrpsee::core::Error::RestartNeeded(_) => Some(TransientKind::ConnectionClosed),
			jsonrpsee::core::Error::Transport(transport) => {
				match transport.downcast_ref::<std::io::Error>().map(std::io::Error::kind) {
					Some(std::io::ErrorKind::ConnectionRefused) => {
						Some(TransientKind::ConnectionRefused)
					},
					Some(std::io::ErrorKind::BrokenPipe) => Some(TransientKind::BrokenPipe),
					Some(
						std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted,
					) => Some(TransientKind::ConnectionClosed),
					_ => {
						// transports don't always surface a typed io error
						let msg = transport.to_string().to_lowercase();
						if msg.contains("connection refused") {
							Some(TransientKind::ConnectionRefused)
						} else if msg.contains("broken pipe") {
							Some(TransientKind::BrokenPipe)
						} else if msg.contains("connection closed") || msg.contains("connection reset")
						{
							Some(TransientKind::ConnectionClosed)
						} else {
							None
						}
					},
				}
			},
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn io_transport(kind: std::io::ErrorKind) -> ChainError {
		ChainError::Rpc(jsonrpsee::core::Error::Transport(
			std::io::Error::new(kind, "boom").into(),
		))
	}

	#[test]
	fn recognizes_transient_faults() {
		assert_eq!(
			io_transport(std::io::ErrorKind::ConnectionRefused).transient_kind(),
			Some(TransientKind::ConnectionRefused)
		);
		assert_eq!(
			io_transport(std::io::ErrorKind::BrokenPipe).transient_kind(),
			Some(TransientKind::BrokenPipe)
		);
		assert_eq!(
			ChainError::Rpc(jsonrpsee::core::Error::RestartNeeded("ws closed".into()))
				.transient_kind(),
			Some(TransientKind::ConnectionClosed)
		);
	}

	#[test]
	fn other_errors_are_unexpected() {
		assert_eq!(ChainError::EmptyResponse("get_block").transient_kind(), None);
		assert_eq!(io_transport(std::io::ErrorKind::TimedOut).transient_kind(), None);
	}
}
