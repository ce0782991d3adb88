//! Peer-credential access control for the command channel.
//!
//! The caller's identity comes from the Unix socket (`SO_PEERCRED`), never
//! from the request. [`AclGate`] wraps the channel's routes and rejects
//! every request whose peer is not allowed by the server's ACL.

use crate::config::AclConfig;
use crate::error::{self, Error};
use crate::runner::ActiveConfig;
use actix_web::{
    Error as ActixError, HttpMessage,
    dev::{Extensions, Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    rt::net::UnixStream,
};
use futures::future::{LocalBoxFuture, Ready, ready};
use nix::unistd::{Gid, Uid, User, getgrouplist};
use std::any::Any;
use std::ffi::CString;
use std::sync::Arc;

/// Identity of the process on the other end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
    pub uid: u32,
    pub gid: u32,
    pub pid: Option<i32>,
}

/// Authorized caller of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionIdentity {
    pub uid: u32,
    pub gids: Vec<u32>,
}

/// Captures the peer credentials of a freshly accepted connection.
///
/// Passed to `HttpServer::on_connect`; requests read them back through
/// [`ConnectionPeer`].
pub fn capture_peer(conn: &dyn Any, ext: &mut Extensions) {
    let Some(stream) = conn.downcast_ref::<UnixStream>() else {
        return;
    };
    match stream.peer_cred() {
        Ok(cred) => {
            ext.insert(PeerCredentials {
                uid: cred.uid(),
                gid: cred.gid(),
                pid: cred.pid(),
            });
        }
        Err(e) => tracing::warn!(error = %e, "Cannot read peer credentials"),
    }
}

/// Where the gate gets the caller's credentials from.
pub trait PeerSource: Send + Sync {
    fn peer(&self, req: &ServiceRequest) -> Option<PeerCredentials>;
}

/// Reads the credentials captured by [`capture_peer`].
#[derive(Debug, Default)]
pub struct ConnectionPeer;

impl PeerSource for ConnectionPeer {
    fn peer(&self, req: &ServiceRequest) -> Option<PeerCredentials> {
        req.conn_data::<PeerCredentials>().copied()
    }
}

/// Group memberships of a user.
pub trait GroupResolver: Send + Sync {
    fn groups(&self, uid: u32, primary_gid: u32) -> error::Result<Vec<u32>>;
}

/// Resolves memberships from the system user and group databases.
#[derive(Debug, Default)]
pub struct SystemGroups;

impl GroupResolver for SystemGroups {
    fn groups(&self, uid: u32, primary_gid: u32) -> error::Result<Vec<u32>> {
        let user = User::from_uid(Uid::from_raw(uid))
            .map_err(|e| Error::Unauthorized(format!("user lookup for uid {} failed: {}", uid, e)))?
            .ok_or_else(|| Error::Unauthorized(format!("uid {} has no user entry", uid)))?;
        let name = CString::new(user.name.as_bytes())
            .map_err(|e| Error::Unauthorized(format!("invalid user name: {}", e)))?;
        let groups = getgrouplist(&name, Gid::from_raw(primary_gid))
            .map_err(|e| Error::Unauthorized(format!("group lookup for uid {} failed: {}", uid, e)))?;
        Ok(groups.into_iter().map(Gid::as_raw).collect())
    }
}

/// Decides whether `peer` may use a channel guarded by `acl`.
///
/// A missing ACL denies everyone. A listed user ID is allowed without a
/// group lookup; otherwise one of the peer's groups must be listed.
pub fn authorize(
    acl: Option<&AclConfig>,
    peer: &PeerCredentials,
    groups: &dyn GroupResolver,
) -> error::Result<ConnectionIdentity> {
    let acl = acl.ok_or_else(|| {
        Error::Unauthorized(format!("no ACL configured, denying uid {}", peer.uid))
    })?;

    if acl.users.contains(&peer.uid) {
        return Ok(ConnectionIdentity {
            uid: peer.uid,
            gids: vec![peer.gid],
        });
    }

    if acl.groups.is_empty() {
        return Err(Error::Unauthorized(format!("uid {} is not allowed", peer.uid)));
    }

    let gids = groups.groups(peer.uid, peer.gid)?;
    if gids.iter().any(|gid| acl.groups.contains(gid)) {
        Ok(ConnectionIdentity {
            uid: peer.uid,
            gids,
        })
    } else {
        Err(Error::Unauthorized(format!(
            "uid {} (groups {:?}) is not allowed",
            peer.uid, gids
        )))
    }
}

/// Everything the gate needs for one decision.
pub struct AclPolicy {
    config: ActiveConfig,
    peers: Arc<dyn PeerSource>,
    groups: Arc<dyn GroupResolver>,
}

impl AclPolicy {
    pub fn new(
        config: ActiveConfig,
        peers: Arc<dyn PeerSource>,
        groups: Arc<dyn GroupResolver>,
    ) -> Self {
        Self {
            config,
            peers,
            groups,
        }
    }

    /// Policy for a live channel: socket credentials and system groups.
    pub fn system(config: ActiveConfig) -> Self {
        Self::new(config, Arc::new(ConnectionPeer), Arc::new(SystemGroups))
    }

    /// Authorizes one request against the current ACL.
    pub fn check(&self, req: &ServiceRequest) -> error::Result<ConnectionIdentity> {
        let peer = self
            .peers
            .peer(req)
            .ok_or_else(|| Error::Unauthorized("peer credentials unavailable".to_string()))?;
        let config = self.config.current();
        authorize(config.server.acl.as_ref(), &peer, self.groups.as_ref())
    }
}

/// ACL middleware factory
pub struct AclGate {
    policy: Arc<AclPolicy>,
}

impl AclGate {
    pub fn new(policy: Arc<AclPolicy>) -> Self {
        Self { policy }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AclGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type Transform = AclGateMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AclGateMiddleware {
            service,
            policy: self.policy.clone(),
        }))
    }
}

/// ACL middleware implementation
pub struct AclGateMiddleware<S> {
    service: S,
    policy: Arc<AclPolicy>,
}

impl<S, B> Service<ServiceRequest> for AclGateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match self.policy.check(&req) {
            Ok(identity) => {
                tracing::debug!(uid = identity.uid, gids = ?identity.gids, path = %req.path(), "Command channel access granted");
                req.extensions_mut().insert(identity);
                let fut = self.service.call(req);
                Box::pin(async move {
                    let res = fut.await?;
                    Ok(res)
                })
            }
            Err(e) => {
                tracing::warn!(path = %req.path(), error = %e, "Command channel access denied");
                Box::pin(async move { Err(e.into()) })
            }
        }
    }
}
