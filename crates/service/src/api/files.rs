use common::acl::Permission;
use common::auth::AuthContext;
use common::error::EngineError;
use common::uid::Uid;
use common::version::parse_stamp;

use super::messages::{
    DataPayload, GetFileRequest, PurgeOldVersionsRequest, PurgedPayload, PutFilePayload,
    PutFileRequest, RestoredPayload, UidRequest, VersionRequest, VersionsPayload,
};
use super::{parse_uid, ApiError, FileService, Response};

impl FileService {
    /// Refuse to buffer chunks for a file the caller could not write anyway
    async fn ensure_writable(&self, uid: Uid, auth: &AuthContext) -> Result<(), ApiError> {
        if self
            .engine()
            .check_permission(Some(uid), Permission::Write, auth)
            .await?
        {
            return Ok(());
        }
        Err(EngineError::PermissionDenied {
            user: auth.user.clone(),
            permission: Permission::Write,
            resource: uid.to_string(),
        }
        .into())
    }

    /// Store a new version, either whole or one chunk at a time.
    ///
    /// Without `total_chunks` (or with a single chunk) `data` is the whole
    /// payload. Otherwise chunks are buffered until the last one arrives and
    /// only then stored as one version.
    pub async fn put_file(&self, request: PutFileRequest) -> Response<PutFilePayload> {
        let result = async move {
            let uid = parse_uid(&request.uid)?;
            let auth = &request.auth;

            let data = match request.total_chunks {
                None => request.data,
                Some(total) => {
                    let index = request.chunk_index.unwrap_or(0);
                    if index == 0 && total > 1 {
                        self.ensure_writable(uid, auth).await?;
                    }
                    let available = self
                        .engine()
                        .storage_usage(&auth.tenant, auth)
                        .await?
                        .available_space;
                    match self
                        .uploads
                        .push(&auth.tenant, uid, index, total, request.data, available)?
                    {
                        Some(data) => data,
                        None => {
                            tracing::debug!("buffered chunk {} of {} for {}", index, total, uid);
                            return Ok(PutFilePayload {
                                complete: false,
                                version: None,
                            });
                        }
                    }
                }
            };

            let stamp = self.engine().put_file(uid, data, auth).await?;
            Ok::<_, ApiError>(PutFilePayload {
                complete: true,
                version: Some(stamp.to_string()),
            })
        };
        result.await.into()
    }

    pub async fn get_file(&self, request: GetFileRequest) -> Response<DataPayload> {
        let result = async {
            let uid = parse_uid(&request.uid)?;
            let timestamp = match request.version_timestamp.as_deref() {
                None | Some("") => None,
                Some(raw) => Some(parse_stamp(raw)?),
            };
            let data = self.engine().get_file(uid, timestamp, &request.auth).await?;
            Ok::<_, ApiError>(DataPayload { data })
        };
        result.await.into()
    }

    pub async fn get_version(&self, request: VersionRequest) -> Response<DataPayload> {
        let result = async {
            let uid = parse_uid(&request.uid)?;
            let timestamp = parse_stamp(&request.version_timestamp)?;
            let data = self
                .engine()
                .get_version(uid, timestamp, &request.auth)
                .await?;
            Ok::<_, ApiError>(DataPayload { data })
        };
        result.await.into()
    }

    pub async fn list_versions(&self, request: UidRequest) -> Response<VersionsPayload> {
        let result = async {
            let uid = parse_uid(&request.uid)?;
            let versions = self.engine().list_versions(uid, &request.auth).await?;
            Ok::<_, ApiError>(VersionsPayload {
                versions: versions.iter().map(|v| v.to_string()).collect(),
            })
        };
        result.await.into()
    }

    pub async fn restore_to_version(&self, request: VersionRequest) -> Response<RestoredPayload> {
        let result = async {
            let uid = parse_uid(&request.uid)?;
            let timestamp = parse_stamp(&request.version_timestamp)?;
            let restored = self
                .engine()
                .restore_to_version(uid, timestamp, &request.auth)
                .await?;
            Ok::<_, ApiError>(RestoredPayload {
                restored_version: restored.to_string(),
            })
        };
        result.await.into()
    }

    pub async fn purge_old_versions(
        &self,
        request: PurgeOldVersionsRequest,
    ) -> Response<PurgedPayload> {
        let result = async {
            let uid = parse_uid(&request.uid)?;
            let purged = self
                .engine()
                .purge_old_versions(uid, request.keep_count as usize, &request.auth)
                .await?;
            Ok::<_, ApiError>(PurgedPayload { purged })
        };
        result.await.into()
    }
}
