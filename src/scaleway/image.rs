//! Image resolution helpers for the Scaleway provider.

use std::future::Future;

use scaleway_rs::{ScalewayImage, ScalewayListInstanceImagesBuilder};
use uuid::Uuid;

use super::{ScalewayCompute, ScalewayComputeError};
use crate::remote::CommandRunner;

/// What the caller asked for, scoped to the configured project and zone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) struct ImageQuery {
    pub(super) label: String,
    pub(super) architecture: String,
    pub(super) zone: String,
    pub(super) project_id: String,
    pub(super) organisation_id: Option<String>,
}

impl<R: CommandRunner> ScalewayCompute<R> {
    pub(super) fn image_query(&self, image: &str) -> ImageQuery {
        ImageQuery {
            label: image.to_owned(),
            architecture: self.config.default_architecture.clone(),
            zone: self.config.default_zone.clone(),
            project_id: self.config.default_project_id.clone(),
            organisation_id: self.config.default_organization_id.clone(),
        }
    }

    /// Returns `image` unchanged when it is already an image UUID, otherwise
    /// resolves the label to the newest available image.
    pub(super) async fn resolve_image_id(
        &self,
        query: &ImageQuery,
    ) -> Result<String, ScalewayComputeError> {
        if Uuid::parse_str(&query.label).is_ok() {
            return Ok(query.label.clone());
        }
        resolve_image_id_with(
            query,
            || async move {
                if query.project_id.is_empty() {
                    Ok(Vec::new())
                } else {
                    let mut scoped =
                        ScalewayListInstanceImagesBuilder::new(self.api.clone(), &query.zone)
                            .public(true)
                            .project(&query.project_id)
                            .name(&query.label)
                            .arch(&query.architecture);
                    if let Some(org) = &query.organisation_id {
                        scoped = scoped.organization(org);
                    }
                    scoped.run_async().await.map_err(ScalewayComputeError::from)
                }
            },
            || async move {
                ScalewayListInstanceImagesBuilder::new(self.api.clone(), &query.zone)
                    .public(true)
                    .name(&query.label)
                    .arch(&query.architecture)
                    .run_async()
                    .await
                    .map_err(ScalewayComputeError::from)
            },
        )
        .await
    }
}

pub(super) async fn resolve_image_id_with<FutA, FutB, FetchA, FetchB>(
    query: &ImageQuery,
    project_fetch: FetchA,
    public_fetch: FetchB,
) -> Result<String, ScalewayComputeError>
where
    FetchA: FnOnce() -> FutA,
    FetchB: FnOnce() -> FutB,
    FutA: Future<Output = Result<Vec<ScalewayImage>, ScalewayComputeError>>,
    FutB: Future<Output = Result<Vec<ScalewayImage>, ScalewayComputeError>>,
{
    let project_images = project_fetch().await?;

    let public_images = if project_images.is_empty() {
        public_fetch().await?
    } else {
        Vec::new()
    };

    let primary = if project_images.is_empty() {
        public_images
    } else {
        project_images
    };
    select_image_id(filter_images(primary, query), query)
}

pub(super) fn select_image_id(
    mut candidates: Vec<ScalewayImage>,
    query: &ImageQuery,
) -> Result<String, ScalewayComputeError> {
    if candidates.is_empty() {
        return Err(ScalewayComputeError::ImageNotFound {
            label: query.label.clone(),
            arch: query.architecture.clone(),
            zone: query.zone.clone(),
        });
    }
    candidates.sort_by(|lhs, rhs| rhs.creation_date.cmp(&lhs.creation_date));
    Ok(candidates.remove(0).id)
}

pub(super) fn filter_images(
    images: Vec<ScalewayImage>,
    query: &ImageQuery,
) -> Vec<ScalewayImage> {
    images
        .into_iter()
        .filter(|image| image.arch == query.architecture)
        .filter(|image| image.state == "available")
        .collect()
}
