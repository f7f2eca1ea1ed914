use common::tree::DirectoryEntry;

use super::messages::{
    EntriesPayload, ExistsPayload, InfoPayload, MakeDirectoryRequest, RenameRequest,
    TouchRequest, TransferRequest, UidPayload, UidRequest,
};
use super::{parse_parent, parse_uid, ApiError, FileService, Response};

fn entries(list: Vec<DirectoryEntry>) -> EntriesPayload {
    EntriesPayload {
        entries: list.into_iter().map(Into::into).collect(),
    }
}

impl FileService {
    pub async fn make_directory(&self, request: MakeDirectoryRequest) -> Response<UidPayload> {
        let result = async {
            let parent = parse_parent(&request.parent_uid)?;
            let mode = (request.permissions != 0).then_some(request.permissions);
            let uid = self
                .engine()
                .make_directory(parent, &request.name, &request.auth, mode)
                .await?;
            Ok::<_, ApiError>(UidPayload {
                uid: uid.to_string(),
            })
        };
        result.await.into()
    }

    pub async fn touch(&self, request: TouchRequest) -> Response<UidPayload> {
        let result = async {
            let parent = parse_parent(&request.parent_uid)?;
            let uid = self
                .engine()
                .touch(parent, &request.name, &request.auth)
                .await?;
            Ok::<_, ApiError>(UidPayload {
                uid: uid.to_string(),
            })
        };
        result.await.into()
    }

    pub async fn remove_directory(&self, request: UidRequest) -> Response<()> {
        let result = async {
            let uid = parse_uid(&request.uid)?;
            self.engine().remove_directory(uid, &request.auth).await?;
            Ok::<_, ApiError>(())
        };
        result.await.into()
    }

    pub async fn remove_file(&self, request: UidRequest) -> Response<()> {
        let result = async {
            let uid = parse_uid(&request.uid)?;
            self.engine().remove_file(uid, &request.auth).await?;
            self.uploads.discard(&request.auth.tenant, uid);
            Ok::<_, ApiError>(())
        };
        result.await.into()
    }

    pub async fn undelete_file(&self, request: UidRequest) -> Response<()> {
        let result = async {
            let uid = parse_uid(&request.uid)?;
            self.engine().undelete_file(uid, &request.auth).await?;
            Ok::<_, ApiError>(())
        };
        result.await.into()
    }

    /// Permanently destroy a soft-deleted node
    pub async fn purge(&self, request: UidRequest) -> Response<()> {
        let result = async {
            let uid = parse_uid(&request.uid)?;
            self.engine().purge(uid, &request.auth).await?;
            self.uploads.discard(&request.auth.tenant, uid);
            Ok::<_, ApiError>(())
        };
        result.await.into()
    }

    pub async fn list_directory(&self, request: UidRequest) -> Response<EntriesPayload> {
        let result = async {
            let uid = parse_parent(&request.uid)?;
            let list = self.engine().list_directory(uid, &request.auth).await?;
            Ok::<_, ApiError>(entries(list))
        };
        result.await.into()
    }

    pub async fn list_directory_with_deleted(
        &self,
        request: UidRequest,
    ) -> Response<EntriesPayload> {
        let result = async {
            let uid = parse_parent(&request.uid)?;
            let list = self
                .engine()
                .list_directory_with_deleted(uid, &request.auth)
                .await?;
            Ok::<_, ApiError>(entries(list))
        };
        result.await.into()
    }

    pub async fn stat(&self, request: UidRequest) -> Response<InfoPayload> {
        let result = async {
            let uid = parse_uid(&request.uid)?;
            let info = self.engine().stat(uid, &request.auth).await?;
            Ok::<_, ApiError>(InfoPayload { info: info.into() })
        };
        result.await.into()
    }

    pub async fn exists(&self, request: UidRequest) -> Response<ExistsPayload> {
        let result = async {
            // a malformed uid names nothing
            let Ok(uid) = parse_uid(&request.uid) else {
                return Ok(ExistsPayload { exists: false });
            };
            let exists = self.engine().exists(uid, &request.auth).await?;
            Ok::<_, ApiError>(ExistsPayload { exists })
        };
        result.await.into()
    }

    pub async fn rename(&self, request: RenameRequest) -> Response<()> {
        let result = async {
            let uid = parse_uid(&request.uid)?;
            self.engine()
                .rename(uid, &request.new_name, &request.auth)
                .await?;
            Ok::<_, ApiError>(())
        };
        result.await.into()
    }

    pub async fn move_node(&self, request: TransferRequest) -> Response<()> {
        let result = async {
            let uid = parse_uid(&request.source_uid)?;
            let destination = parse_parent(&request.destination_parent_uid)?;
            self.engine().mv(uid, destination, &request.auth).await?;
            Ok::<_, ApiError>(())
        };
        result.await.into()
    }

    pub async fn copy(&self, request: TransferRequest) -> Response<UidPayload> {
        let result = async {
            let uid = parse_uid(&request.source_uid)?;
            let destination = parse_parent(&request.destination_parent_uid)?;
            let copy = self.engine().copy(uid, destination, &request.auth).await?;
            Ok::<_, ApiError>(UidPayload {
                uid: copy.to_string(),
            })
        };
        result.await.into()
    }
}
