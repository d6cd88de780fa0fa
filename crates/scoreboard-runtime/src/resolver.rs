#![forbid(unsafe_code)]

//! Per-viewer template resolution.
//!
//! Precedence, strongest first:
//!
//! 1. **Disabled**: any disable request means no panel at all.
//! 2. **Override**: the most recent override's target, which may be an
//!    explicit "no template". Overrides bypass routing, permissions, and
//!    conditions.
//! 3. **Routed**: the first candidate for the viewer's location whose
//!    permission is empty or held and whose conditions all hold.
//!
//! Hidden is reported alongside the selection, never instead of it: the
//! would-be template is still computed so that showing the viewer again
//! restores exactly what routing would have picked.

use std::borrow::Cow;
use std::sync::Arc;

use scoreboard_core::{ConditionContext, RequesterId, Template, ViewerId};

use crate::host::{AccessControl, PlaceholderResolver};
use crate::registry::Catalog;
use crate::viewer_state::ViewerRecord;

/// Which template a viewer should see, and why.
#[derive(Debug, Clone)]
pub enum Selection {
    /// At least one requester disabled the viewer.
    Disabled,
    /// An override decided; `template` is `None` for an explicit "none" or
    /// an unknown template name.
    Override {
        /// Requester whose override won.
        requester: RequesterId,
        /// Forced template.
        template: Option<Arc<Template>>,
    },
    /// Routing decided; `None` when no candidate qualified.
    Routed(Option<Arc<Template>>),
}

impl Selection {
    /// The selected template, if any.
    #[must_use]
    pub fn template(&self) -> Option<&Arc<Template>> {
        match self {
            Selection::Disabled => None,
            Selection::Override { template, .. } | Selection::Routed(template) => template.as_ref(),
        }
    }
}

/// Outcome of resolving one viewer.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The selection.
    pub selection: Selection,
    /// Whether any requester hides the viewer.
    pub hidden: bool,
}

impl Resolution {
    /// The selected template regardless of hiding.
    #[must_use]
    pub fn template(&self) -> Option<&Arc<Template>> {
        self.selection.template()
    }

    /// The template to draw now: `None` when hidden, disabled, or unselected.
    #[must_use]
    pub fn renderable(&self) -> Option<&Arc<Template>> {
        if self.hidden {
            None
        } else {
            self.template()
        }
    }

    /// Whether the viewer is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        matches!(self.selection, Selection::Disabled)
    }
}

/// Condition context for one viewer.
struct ViewerConditions<'a> {
    viewer: ViewerId,
    location: &'a str,
    access: &'a dyn AccessControl,
    placeholders: &'a dyn PlaceholderResolver,
}

impl ConditionContext for ViewerConditions<'_> {
    fn has_permission(&self, permission: &str) -> bool {
        self.access.has_permission(self.viewer, permission)
    }

    fn location(&self) -> &str {
        self.location
    }

    fn resolve_text<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        match self.placeholders.resolve(self.viewer, raw) {
            Ok(text) => text,
            Err(error) => {
                tracing::debug!(viewer = %self.viewer, %error, "condition input kept unsubstituted");
                Cow::Borrowed(raw)
            }
        }
    }
}

/// Resolves viewers against one catalog generation.
pub struct Resolver<'a> {
    catalog: &'a Catalog,
    access: &'a dyn AccessControl,
    placeholders: &'a dyn PlaceholderResolver,
}

impl<'a> Resolver<'a> {
    /// Create a resolver.
    pub fn new(
        catalog: &'a Catalog,
        access: &'a dyn AccessControl,
        placeholders: &'a dyn PlaceholderResolver,
    ) -> Self {
        Self {
            catalog,
            access,
            placeholders,
        }
    }

    /// Resolve `viewer`, currently at `location`, with state `record`.
    #[must_use]
    pub fn resolve(&self, viewer: ViewerId, location: &str, record: &ViewerRecord) -> Resolution {
        let hidden = record.is_hidden();
        if record.is_disabled() {
            return Resolution {
                selection: Selection::Disabled,
                hidden,
            };
        }

        if let Some((requester, target)) = record.effective_override() {
            let template = target.and_then(|name| self.catalog.resolve_reference(name));
            return Resolution {
                selection: Selection::Override {
                    requester: requester.clone(),
                    template,
                },
                hidden,
            };
        }

        let route = self.catalog.route_for(location);
        let template = route
            .iter()
            .find(|template| self.is_eligible(viewer, location, template))
            .cloned();
        Resolution {
            selection: Selection::Routed(template),
            hidden,
        }
    }

    /// Whether `viewer` may see `template` through routing.
    #[must_use]
    pub fn is_eligible(&self, viewer: ViewerId, location: &str, template: &Template) -> bool {
        if let Some(permission) = template.permission()
            && !self.access.has_permission(viewer, permission)
        {
            return false;
        }
        if template.conditions().is_empty() {
            return true;
        }
        let ctx = ViewerConditions {
            viewer,
            location,
            access: self.access,
            placeholders: self.placeholders,
        };
        template.conditions().iter().all(|id| {
            self.catalog
                .condition(id)
                .is_some_and(|condition| condition.evaluate(&ctx))
        })
    }
}
