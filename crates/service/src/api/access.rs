use common::quota::StorageUsage;
use common::version::parse_stamp;

use super::messages::{
    CheckPermissionRequest, HasPermissionPayload, MetadataKeyRequest, MetadataPayload,
    PermissionChangeRequest, SetMetadataRequest, SyncPayload, TenantRequest, UidRequest,
    ValuePayload, VersionMetadataRequest,
};
use super::{parse_parent, parse_permission, parse_uid, ApiError, FileService, Response};

impl FileService {
    pub async fn set_metadata(&self, request: SetMetadataRequest) -> Response<()> {
        let result = async {
            let uid = parse_uid(&request.uid)?;
            self.engine()
                .set_metadata(uid, &request.key, &request.value, &request.auth)
                .await?;
            Ok::<_, ApiError>(())
        };
        result.await.into()
    }

    pub async fn get_metadata(&self, request: MetadataKeyRequest) -> Response<ValuePayload> {
        let result = async {
            let uid = parse_uid(&request.uid)?;
            let value = self
                .engine()
                .get_metadata(uid, &request.key, &request.auth)
                .await?;
            Ok::<_, ApiError>(ValuePayload { value })
        };
        result.await.into()
    }

    pub async fn get_all_metadata(&self, request: UidRequest) -> Response<MetadataPayload> {
        let result = async {
            let uid = parse_uid(&request.uid)?;
            let metadata = self.engine().get_all_metadata(uid, &request.auth).await?;
            Ok::<_, ApiError>(MetadataPayload { metadata })
        };
        result.await.into()
    }

    pub async fn delete_metadata(&self, request: MetadataKeyRequest) -> Response<()> {
        let result = async {
            let uid = parse_uid(&request.uid)?;
            self.engine()
                .delete_metadata(uid, &request.key, &request.auth)
                .await?;
            Ok::<_, ApiError>(())
        };
        result.await.into()
    }

    pub async fn get_metadata_for_version(
        &self,
        request: VersionMetadataRequest,
    ) -> Response<ValuePayload> {
        let result = async {
            let uid = parse_uid(&request.uid)?;
            let timestamp = parse_stamp(&request.version_timestamp)?;
            let key = request.key.as_deref().unwrap_or_default();
            let value = self
                .engine()
                .get_metadata_for_version(uid, timestamp, key, &request.auth)
                .await?;
            Ok::<_, ApiError>(ValuePayload { value })
        };
        result.await.into()
    }

    pub async fn get_all_metadata_for_version(
        &self,
        request: VersionMetadataRequest,
    ) -> Response<MetadataPayload> {
        let result = async {
            let uid = parse_uid(&request.uid)?;
            let timestamp = parse_stamp(&request.version_timestamp)?;
            let metadata = self
                .engine()
                .get_all_metadata_for_version(uid, timestamp, &request.auth)
                .await?;
            Ok::<_, ApiError>(MetadataPayload { metadata })
        };
        result.await.into()
    }

    pub async fn grant_permission(&self, request: PermissionChangeRequest) -> Response<()> {
        let result = async {
            let uid = parse_uid(&request.resource_uid)?;
            let permission = parse_permission(request.permission)?;
            self.engine()
                .grant_permission(uid, &request.principal, permission, &request.auth)
                .await?;
            Ok::<_, ApiError>(())
        };
        result.await.into()
    }

    pub async fn revoke_permission(&self, request: PermissionChangeRequest) -> Response<()> {
        let result = async {
            let uid = parse_uid(&request.resource_uid)?;
            let permission = parse_permission(request.permission)?;
            self.engine()
                .revoke_permission(uid, &request.principal, permission, &request.auth)
                .await?;
            Ok::<_, ApiError>(())
        };
        result.await.into()
    }

    /// `resource_uid` may be empty to ask about the tenant root
    pub async fn check_permission(
        &self,
        request: CheckPermissionRequest,
    ) -> Response<HasPermissionPayload> {
        let result = async {
            let resource = parse_parent(&request.resource_uid)?;
            let permission = parse_permission(request.required_permission)?;
            let has_permission = self
                .engine()
                .check_permission(resource, permission, &request.auth)
                .await?;
            Ok::<_, ApiError>(HasPermissionPayload { has_permission })
        };
        result.await.into()
    }

    pub async fn storage_usage(&self, request: TenantRequest) -> Response<StorageUsage> {
        let result = async {
            let tenant = request.tenant.as_deref().unwrap_or(&request.auth.tenant);
            let usage = self.engine().storage_usage(tenant, &request.auth).await?;
            Ok::<_, ApiError>(usage)
        };
        result.await.into()
    }

    /// Queue a persistence pass; never waits for it to run
    pub async fn trigger_sync(&self, request: TenantRequest) -> Response<SyncPayload> {
        let tenant = request.tenant.as_deref().unwrap_or(&request.auth.tenant);
        let result = self
            .state()
            .sync()
            .trigger_sync(tenant, &request.auth)
            .map(|ack| SyncPayload { ack })
            .map_err(ApiError::from);
        result.into()
    }
}
