// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Organization scope extraction.
//!
//! The upstream authentication proxy resolves the caller's tenant and forwards
//! it in the `x-organization` header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::ApiError;

/// Header carrying the caller's organization id.
pub const ORGANIZATION_HEADER: &str = "x-organization";

/// Organization the request acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Organization(pub Uuid);

impl<S> FromRequestParts<S> for Organization
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(ORGANIZATION_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .ok_or_else(|| ApiError::Unauthorized("Organization required".to_string()))?;

        let id = Uuid::parse_str(value)
            .ok()
            .filter(|id| !id.is_nil())
            .ok_or_else(|| ApiError::Unauthorized("Invalid organization".to_string()))?;

        Ok(Organization(id))
    }
}
