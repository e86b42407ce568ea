//! Identity resolution.
//!
//! Resolves the platform actor behind an activity to a canonical member.
//! Lookup order: exact `(platform, source_id)` binding, exact
//! `(platform, username)` binding, fuzzy similarity across existing
//! members, then member creation. Every path except the source-id hit
//! binds a new identity row so the next activity from the same actor
//! resolves exactly.

use std::sync::Arc;

use tracing::{debug, warn};

use sigmesh_core::{
    Activity, Error, IdentityConfig, IdentityResolution, IdentityStore, MemberStore, NewIdentity,
    NewMember, Result,
};

/// Actor fields extracted from an activity's raw attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityInfo {
    pub username: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl IdentityInfo {
    fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.display_name.is_none()
    }

    /// Best available term for fuzzy matching and member naming.
    fn best_name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .or(self.username.as_deref())
            .or(self.email.as_deref())
    }
}

/// Pull actor information out of an activity's platform attributes.
///
/// Platforms nest author data differently; we check the common `author`
/// block first, then top-level keys, and finally fall back to the
/// platform-native `source_id` as a username.
pub fn extract_identity_info(activity: &Activity) -> IdentityInfo {
    let attrs = &activity.attributes;
    let author = attrs.get("author");

    let pick = |keys: &[&str]| -> Option<String> {
        for scope in [author, Some(attrs)].into_iter().flatten() {
            for key in keys {
                if let Some(value) = scope.get(key).and_then(|v| v.as_str()) {
                    let trimmed = value.trim();
                    if !trimmed.is_empty() {
                        return Some(trimmed.to_string());
                    }
                }
            }
        }
        None
    };

    let mut info = IdentityInfo {
        username: pick(&["username", "login"]),
        email: pick(&["email"]),
        display_name: pick(&["name", "display_name", "displayName"]),
    };

    if info.username.is_none() && !activity.source_id.trim().is_empty() {
        info.username = Some(activity.source_id.trim().to_string());
    }
    info
}

/// Resolves activities to canonical members.
pub struct IdentityResolver {
    members: Arc<dyn MemberStore>,
    identities: Arc<dyn IdentityStore>,
    config: IdentityConfig,
}

impl IdentityResolver {
    pub fn new(
        members: Arc<dyn MemberStore>,
        identities: Arc<dyn IdentityStore>,
        config: IdentityConfig,
    ) -> Self {
        Self {
            members,
            identities,
            config,
        }
    }

    /// Resolve an activity's actor to a member id.
    ///
    /// Returns [`Error::NoIdentityInfo`] when the activity carries no
    /// username, email, display name, or source id. A fuzzy-match failure
    /// degrades to member creation rather than failing resolution.
    pub async fn resolve(&self, activity: &Activity) -> Result<IdentityResolution> {
        let info = extract_identity_info(activity);
        if info.is_empty() {
            return Err(Error::NoIdentityInfo(activity.id));
        }

        let tenant = activity.tenant_id.as_str();
        let platform = activity.platform.as_str();

        // 1. Exact binding by platform-native id.
        if !activity.source_id.trim().is_empty() {
            if let Some(identity) = self
                .identities
                .find_by_platform_and_source_id(platform, &activity.source_id, tenant)
                .await?
            {
                debug!(
                    subsystem = "enrich",
                    op = "resolve_identity",
                    activity_id = %activity.id,
                    member_id = %identity.member_id,
                    "Resolved by source id"
                );
                return Ok(IdentityResolution {
                    member_id: identity.member_id,
                    is_new_member: false,
                    is_new_identity: false,
                });
            }
        }

        // 2. Exact binding by username.
        if let Some(username) = &info.username {
            if let Some(identity) = self
                .identities
                .find_by_platform_and_username(platform, username, tenant)
                .await?
            {
                self.bind_identity(identity.member_id, activity, &info).await?;
                debug!(
                    subsystem = "enrich",
                    op = "resolve_identity",
                    activity_id = %activity.id,
                    member_id = %identity.member_id,
                    "Resolved by username"
                );
                return Ok(IdentityResolution {
                    member_id: identity.member_id,
                    is_new_member: false,
                    is_new_identity: true,
                });
            }
        }

        // 3. Fuzzy similarity against existing members.
        if self.config.enable_fuzzy_matching {
            if let Some(term) = info.best_name() {
                match self
                    .members
                    .find_by_fuzzy_match(term, tenant, self.config.fuzzy_match_threshold)
                    .await
                {
                    Ok(matches) => {
                        if let Some(best) = matches.first() {
                            self.bind_identity(best.member_id, activity, &info).await?;
                            debug!(
                                subsystem = "enrich",
                                op = "resolve_identity",
                                activity_id = %activity.id,
                                member_id = %best.member_id,
                                similarity = best.similarity,
                                "Resolved by fuzzy match"
                            );
                            return Ok(IdentityResolution {
                                member_id: best.member_id,
                                is_new_member: false,
                                is_new_identity: true,
                            });
                        }
                    }
                    Err(e) => {
                        warn!(
                            subsystem = "enrich",
                            op = "resolve_identity",
                            activity_id = %activity.id,
                            error = %e,
                            "Fuzzy match failed, falling through to member creation"
                        );
                    }
                }
            }
        }

        // 4. No match anywhere: create the member and bind the identity.
        let display_name = info
            .best_name()
            .unwrap_or(&activity.source_id)
            .to_string();
        let member_id = self
            .members
            .create_member(NewMember {
                display_name,
                emails: info.email.iter().cloned().collect(),
                attributes: serde_json::json!({ "platforms": [platform] }),
                tenant_id: tenant.to_string(),
            })
            .await?;
        self.bind_identity(member_id, activity, &info).await?;

        debug!(
            subsystem = "enrich",
            op = "resolve_identity",
            activity_id = %activity.id,
            member_id = %member_id,
            "Created new member"
        );
        Ok(IdentityResolution {
            member_id,
            is_new_member: true,
            is_new_identity: true,
        })
    }

    async fn bind_identity(
        &self,
        member_id: uuid::Uuid,
        activity: &Activity,
        info: &IdentityInfo,
    ) -> Result<()> {
        self.identities
            .create_identity(NewIdentity {
                member_id,
                platform: activity.platform.clone(),
                username: info
                    .username
                    .clone()
                    .unwrap_or_else(|| activity.source_id.clone()),
                source_id: activity.source_id.clone(),
                tenant_id: activity.tenant_id.clone(),
            })
            .await
    }
}
