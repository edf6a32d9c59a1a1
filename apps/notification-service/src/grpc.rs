//! gRPC twin of the HTTP query API. Same store, same ownership rules; the
//! principal comes from the bearer token in request metadata.

use tonic::{Request, Response, Status};
use uuid::Uuid;

use core_lib::auth::{self, AuthenticatedUser};
use core_lib::CoreError;
use proto::notificationquery::{
    DeleteRequest, DeleteResponse, ListRequest, ListResponse, MarkAllReadRequest,
    MarkAllReadResponse, MarkReadRequest, MarkReadResponse, Notification, UnreadCountRequest,
    UnreadCountResponse,
    notification_query_server::{NotificationQuery, NotificationQueryServer},
};

use crate::store::{NotificationRow, NotificationStore, normalize_pagination};

pub struct NotificationQueryService {
    store: NotificationStore,
    jwt_secret: String,
}

impl NotificationQueryService {
    pub fn new(store: NotificationStore, jwt_secret: String) -> Self {
        Self { store, jwt_secret }
    }

    pub fn into_server(self) -> NotificationQueryServer<Self> {
        NotificationQueryServer::new(self)
    }

    fn authenticate<T>(&self, request: &Request<T>) -> Result<AuthenticatedUser, Status> {
        let header = request
            .metadata()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Status::unauthenticated("Missing authorization metadata"))?;
        let token = auth::bearer_token(header)
            .ok_or_else(|| Status::unauthenticated("Malformed authorization metadata"))?;
        auth::verify_token(token, self.jwt_secret.as_bytes())
            .map_err(|e| Status::unauthenticated(e.to_string()))
    }
}

fn to_proto(row: &NotificationRow) -> Notification {
    Notification {
        id: row.id.to_string(),
        r#type: row.kind.clone(),
        title: row.title.clone(),
        message: row.message.clone(),
        entity_type: row.entity_type.clone(),
        entity_id: row.entity_id.to_string(),
        url: row.url.clone(),
        is_read: row.is_read,
        created_at: row.created_at.to_rfc3339(),
    }
}

fn parse_id(id: &str) -> Result<Uuid, Status> {
    Uuid::parse_str(id).map_err(|_| Status::invalid_argument("Malformed notification id"))
}

fn map_store_error(err: CoreError) -> Status {
    match err {
        CoreError::NotFound(msg) => Status::not_found(msg),
        CoreError::Validation(msg) => Status::invalid_argument(msg),
        other => Status::internal(other.to_string()),
    }
}

#[tonic::async_trait]
impl NotificationQuery for NotificationQueryService {
    async fn list(
        &self,
        request: Request<ListRequest>,
    ) -> Result<Response<ListResponse>, Status> {
        let principal = self.authenticate(&request)?;
        let req = request.into_inner();
        let (page, limit) = normalize_pagination(
            Some(req.page).filter(|p| *p > 0),
            Some(req.limit).filter(|l| *l > 0),
        );

        let result = self
            .store
            .list(principal.user_id, page, limit, req.unread_only)
            .await
            .map_err(map_store_error)?;

        Ok(Response::new(ListResponse {
            notifications: result.items.iter().map(to_proto).collect(),
            total: result.total,
            has_more: result.has_more,
        }))
    }

    async fn unread_count(
        &self,
        request: Request<UnreadCountRequest>,
    ) -> Result<Response<UnreadCountResponse>, Status> {
        let principal = self.authenticate(&request)?;
        let count = self
            .store
            .unread_count(principal.user_id)
            .await
            .map_err(map_store_error)?;
        Ok(Response::new(UnreadCountResponse { count }))
    }

    async fn mark_read(
        &self,
        request: Request<MarkReadRequest>,
    ) -> Result<Response<MarkReadResponse>, Status> {
        let principal = self.authenticate(&request)?;
        let id = parse_id(&request.get_ref().id)?;
        let updated = self
            .store
            .mark_as_read(id, principal.user_id)
            .await
            .map_err(map_store_error)?;
        if updated {
            Ok(Response::new(MarkReadResponse {}))
        } else {
            Err(Status::not_found("No such notification"))
        }
    }

    async fn mark_all_read(
        &self,
        request: Request<MarkAllReadRequest>,
    ) -> Result<Response<MarkAllReadResponse>, Status> {
        let principal = self.authenticate(&request)?;
        let count = self
            .store
            .mark_all_as_read(principal.user_id)
            .await
            .map_err(map_store_error)?;
        Ok(Response::new(MarkAllReadResponse { count }))
    }

    async fn delete(
        &self,
        request: Request<DeleteRequest>,
    ) -> Result<Response<DeleteResponse>, Status> {
        let principal = self.authenticate(&request)?;
        let id = parse_id(&request.get_ref().id)?;
        let deleted = self
            .store
            .delete(id, principal.user_id)
            .await
            .map_err(map_store_error)?;
        if deleted {
            Ok(Response::new(DeleteResponse {}))
        } else {
            Err(Status::not_found("No such notification"))
        }
    }
}
