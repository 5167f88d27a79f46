use std::ops::Deref;

use crate::portal::PortalId;

/// Draw flags for the objects a portal pass has to juggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityFlags {
    pub avatar: bool,
    portals: Vec<bool>,
}

impl VisibilityFlags {
    /// Avatar hidden, every portal shown: the state of the main pass.
    pub fn new(portal_count: usize) -> Self {
        Self {
            avatar: false,
            portals: vec![true; portal_count],
        }
    }

    pub fn is_portal_visible(&self, id: PortalId) -> bool {
        self.portals.get(id.index()).copied().unwrap_or(false)
    }

    pub fn set_portal_visible(&mut self, id: PortalId, visible: bool) {
        if let Some(flag) = self.portals.get_mut(id.index()) {
            *flag = visible;
        }
    }

    pub fn portal_count(&self) -> usize {
        self.portals.len()
    }

    pub fn visible_portals(&self) -> impl Iterator<Item = PortalId> + '_ {
        self.portals
            .iter()
            .enumerate()
            .filter(|(_, visible)| **visible)
            .map(|(index, _)| PortalId(index))
    }
}

/// Shows the avatar and hides both ends of the portal being rendered through,
/// for exactly as long as the scope lives.
///
/// The source is hidden as well as the destination: its surface samples the very
/// texture the pass writes to.
pub struct VisibilityScope<'a> {
    flags: &'a mut VisibilityFlags,
    source: PortalId,
    destination: PortalId,
    prior_avatar: bool,
    prior_source: bool,
    prior_destination: bool,
}

impl<'a> VisibilityScope<'a> {
    pub fn enter(flags: &'a mut VisibilityFlags, source: PortalId, destination: PortalId) -> Self {
        let prior_avatar = flags.avatar;
        let prior_source = flags.is_portal_visible(source);
        let prior_destination = flags.is_portal_visible(destination);

        flags.avatar = true;
        flags.set_portal_visible(source, false);
        flags.set_portal_visible(destination, false);

        Self {
            flags,
            source,
            destination,
            prior_avatar,
            prior_source,
            prior_destination,
        }
    }
}

impl Deref for VisibilityScope<'_> {
    type Target = VisibilityFlags;

    fn deref(&self) -> &Self::Target {
        self.flags
    }
}

impl Drop for VisibilityScope<'_> {
    fn drop(&mut self) {
        // Reverse order, so a degenerate source == destination still restores correctly.
        self.flags
            .set_portal_visible(self.destination, self.prior_destination);
        self.flags.set_portal_visible(self.source, self.prior_source);
        self.flags.avatar = self.prior_avatar;
    }
}
