/*!
 * Unix-Socket Registry Client
 * Blocking request/response client for the registry's control socket
 */

use super::protocol::{read_frame, write_frame, Request, Response};
use super::{ObjectReply, RegistryClient, ResolvedHandle};
use crate::core::errors::{SyncError, SyncResult};
use crate::core::types::Handle;
use crate::object::ObjectKind;
use log::warn;
use parking_lot::Mutex;
use std::os::unix::net::UnixStream;
use std::path::Path;

/// Registry client over a Unix domain socket.
///
/// The stream carries strictly ordered request/response pairs, so a
/// single mutex around it is the whole concurrency story. Registry calls
/// are rare (one per handle per process, plus lifecycle), never on the
/// signal or wake hot path.
pub struct SocketRegistry {
    stream: Mutex<UnixStream>,
}

impl SocketRegistry {
    pub fn connect<P: AsRef<Path>>(path: P) -> SyncResult<Self> {
        let stream = UnixStream::connect(path.as_ref()).map_err(|e| {
            SyncError::Unavailable(format!(
                "cannot connect to registry at {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Ok(Self {
            stream: Mutex::new(stream),
        })
    }

    fn call(&self, request: &Request) -> SyncResult<Response> {
        let mut stream = self.stream.lock();
        write_frame(&mut *stream, request)
            .map_err(|e| SyncError::Registry(format!("send failed: {}", e)))?;
        read_frame(&mut *stream).map_err(|e| SyncError::Registry(format!("receive failed: {}", e)))
    }

    fn expect_object(&self, request: Request) -> SyncResult<ObjectReply> {
        match self.call(&request)? {
            Response::Object {
                handle,
                slot,
                kind,
                already_existed,
            } => Ok(ObjectReply {
                handle: Handle(handle),
                slot,
                kind,
                already_existed,
            }),
            Response::Error(status) => Err(status.into()),
            other => Err(SyncError::Registry(format!(
                "unexpected response {:?}",
                other
            ))),
        }
    }
}

impl RegistryClient for SocketRegistry {
    fn create_object(
        &self,
        kind: ObjectKind,
        access: u32,
        name: Option<&str>,
        init_a: i32,
        init_b: i32,
    ) -> SyncResult<ObjectReply> {
        self.expect_object(Request::CreateObject {
            kind,
            access,
            name: name.map(str::to_owned),
            init_a,
            init_b,
        })
    }

    fn open_object(&self, kind: ObjectKind, access: u32, name: &str) -> SyncResult<ObjectReply> {
        self.expect_object(Request::OpenObject {
            kind,
            access,
            name: name.to_owned(),
        })
    }

    fn resolve_handle(&self, handle: Handle) -> SyncResult<ResolvedHandle> {
        match self.call(&Request::ResolveHandle {
            handle: handle.raw(),
        })? {
            Response::Resolved { slot, kind } => Ok(ResolvedHandle { slot, kind }),
            Response::Error(status) => Err(status.into()),
            other => Err(SyncError::Registry(format!(
                "unexpected response {:?}",
                other
            ))),
        }
    }

    fn set_message_wait(&self, in_wait: bool) {
        if let Err(e) = self.call(&Request::SetMessageWait { in_wait }) {
            warn!("message-wait notification ({}) failed: {}", in_wait, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::protocol::Status;
    use std::thread;

    /// Minimal scripted peer: answers each incoming request with the next
    /// canned response.
    fn scripted_peer(responses: Vec<Response>) -> UnixStream {
        let (ours, theirs) = UnixStream::pair().unwrap();
        thread::spawn(move || {
            let mut stream = theirs;
            for response in responses {
                let Ok(_request) = read_frame::<_, Request>(&mut stream) else {
                    return;
                };
                if write_frame(&mut stream, &response).is_err() {
                    return;
                }
            }
        });
        ours
    }

    fn client_with(responses: Vec<Response>) -> SocketRegistry {
        SocketRegistry {
            stream: Mutex::new(scripted_peer(responses)),
        }
    }

    #[test]
    fn test_create_object_reply() {
        let client = client_with(vec![Response::Object {
            handle: 4,
            slot: 17,
            kind: ObjectKind::Mutex,
            already_existed: false,
        }]);

        let reply = client
            .create_object(ObjectKind::Mutex, 0, Some("lock"), 0, 0)
            .unwrap();
        assert_eq!(reply.handle, Handle(4));
        assert_eq!(reply.slot, 17);
        assert!(!reply.already_existed);
    }

    #[test]
    fn test_registry_error_is_surfaced_verbatim() {
        let client = client_with(vec![Response::Error(Status::InvalidHandle)]);
        let err = client.resolve_handle(Handle(12)).unwrap_err();
        assert_eq!(err, SyncError::InvalidHandle);
    }

    #[test]
    fn test_unexpected_response_is_a_protocol_error() {
        let client = client_with(vec![Response::Ack]);
        let err = client.resolve_handle(Handle(12)).unwrap_err();
        assert!(matches!(err, SyncError::Registry(_)));
    }
}
