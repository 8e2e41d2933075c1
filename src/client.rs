//! Managed client tracking.
//!
//! Every top-level window we manage gets wrapped in a decoration frame and
//! tracked as a [`Client`]. The registry stores clients in an arena keyed by
//! [`ClientId`], with a separate insertion-order list that is traversed
//! circularly for focus cycling. A cursor points at the most recently
//! activated client.

use slotmap::{new_key_type, SlotMap};
use x11rb::protocol::xproto::Window;

use crate::types::Rect;

new_key_type! {
    /// Stable handle for a managed client
    pub struct ClientId;
}

/// A managed application window plus the decoration frame it lives in.
#[derive(Debug, Clone)]
pub struct Client {
    /// The application's own window
    pub window: Window,
    /// The frame we created and reparented the window into; owned 1:1 by
    /// this client and destroyed with it
    pub frame: Window,
    /// Geometry to restore to when un-maximizing; updated whenever a
    /// finished move or resize is persisted
    pub initial: Rect,
    /// Live frame geometry
    pub current: Rect,
    pub maximized: bool,
}

impl Client {
    pub fn new(window: Window, frame: Window, geometry: Rect) -> Self {
        Self {
            window,
            frame,
            initial: geometry,
            current: geometry,
            maximized: false,
        }
    }

    /// Record a finished move/resize so both the live geometry and the
    /// un-maximize restore target reflect it.
    pub fn persist_geometry(&mut self, rect: Rect) {
        self.current = rect;
        self.initial = rect;
    }

    /// Flip the maximized flag and return the geometry the frame should
    /// take: the full screen when maximizing, the recorded restore
    /// geometry when un-maximizing.
    pub fn toggle_maximized(&mut self, screen: Rect) -> Rect {
        self.maximized = !self.maximized;
        self.current = if self.maximized { screen } else { self.initial };
        self.current
    }
}

/// All currently managed clients, in insertion order.
///
/// The order list wraps around: the successor of the last client is the
/// first. The cursor is `None` exactly when the registry is empty, and
/// otherwise always refers to a live member.
#[derive(Default)]
pub struct ClientRegistry {
    clients: SlotMap<ClientId, Client>,
    order: Vec<ClientId>,
    current: Option<ClientId>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(id)
    }

    /// The most recently activated client, if any
    pub fn current(&self) -> Option<ClientId> {
        self.current
    }

    /// Point the cursor at a live client. Stale ids are ignored.
    pub fn set_current(&mut self, id: ClientId) {
        if self.clients.contains_key(id) {
            self.current = Some(id);
        }
    }

    /// Append a client at the tail of the circular order.
    pub fn insert(&mut self, client: Client) -> ClientId {
        let id = self.clients.insert(client);
        self.order.push(id);
        id
    }

    /// Find the client owning `handle`, matching either the application
    /// window or its frame.
    pub fn find(&self, handle: Window) -> Option<ClientId> {
        self.order.iter().copied().find(|&id| {
            let client = &self.clients[id];
            client.window == handle || client.frame == handle
        })
    }

    /// Remove a client and return it. Removing an id that is not present is
    /// a no-op. If the cursor pointed at the removed client it moves to the
    /// circular successor, or clears when the registry empties.
    pub fn remove(&mut self, id: ClientId) -> Option<Client> {
        let pos = self.order.iter().position(|&o| o == id)?;
        self.order.remove(pos);

        if self.current == Some(id) {
            self.current = if self.order.is_empty() {
                None
            } else {
                // `pos` now indexes the old successor; wrap if the tail
                // was removed
                Some(self.order[pos % self.order.len()])
            };
        }

        self.clients.remove(id)
    }

    /// The circular successor of `id`, or `None` if `id` is not a member.
    /// A sole member is its own successor.
    pub fn next_after(&self, id: ClientId) -> Option<ClientId> {
        let pos = self.order.iter().position(|&o| o == id)?;
        Some(self.order[(pos + 1) % self.order.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(n: u32) -> Client {
        Client::new(n, n + 1000, Rect::new(10, 20, 300, 200))
    }

    fn registry_of(count: u32) -> (ClientRegistry, Vec<ClientId>) {
        let mut registry = ClientRegistry::new();
        let ids = (1..=count).map(|n| registry.insert(client(n))).collect();
        (registry, ids)
    }

    #[test]
    fn insertion_preserves_circularity() {
        let (registry, ids) = registry_of(5);
        // Following successors exactly n times from any member returns to it
        for &start in &ids {
            let mut at = start;
            for _ in 0..registry.len() {
                at = registry.next_after(at).unwrap();
            }
            assert_eq!(at, start);
        }
    }

    #[test]
    fn circularity_survives_interior_removal() {
        let (mut registry, ids) = registry_of(4);
        registry.remove(ids[1]);
        registry.remove(ids[3]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.next_after(ids[0]), Some(ids[2]));
        assert_eq!(registry.next_after(ids[2]), Some(ids[0]));
    }

    #[test]
    fn find_matches_window_and_frame() {
        let (registry, ids) = registry_of(3);
        assert_eq!(registry.find(2), Some(ids[1]));
        assert_eq!(registry.find(1002), Some(ids[1]));
    }

    #[test]
    fn find_misses_unknown_and_removed_handles() {
        let (mut registry, ids) = registry_of(2);
        assert_eq!(registry.find(999), None);
        registry.remove(ids[0]);
        assert_eq!(registry.find(1), None);
        assert_eq!(registry.find(1001), None);
    }

    #[test]
    fn remove_sole_member_clears_cursor() {
        let (mut registry, ids) = registry_of(1);
        registry.set_current(ids[0]);
        registry.remove(ids[0]);
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.current(), None);
    }

    #[test]
    fn remove_cursor_target_advances_to_successor() {
        let (mut registry, ids) = registry_of(3);
        registry.set_current(ids[1]);
        registry.remove(ids[1]);
        assert_eq!(registry.current(), Some(ids[2]));

        // Removing the tail wraps the cursor to the head
        registry.set_current(ids[2]);
        registry.remove(ids[2]);
        assert_eq!(registry.current(), Some(ids[0]));
    }

    #[test]
    fn remove_other_member_leaves_cursor_alone() {
        let (mut registry, ids) = registry_of(3);
        registry.set_current(ids[2]);
        registry.remove(ids[0]);
        assert_eq!(registry.current(), Some(ids[2]));
    }

    #[test]
    fn remove_absent_id_is_noop() {
        let (mut registry, ids) = registry_of(2);
        registry.remove(ids[0]);
        assert!(registry.remove(ids[0]).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn map_then_unmap_is_net_zero() {
        let mut registry = ClientRegistry::new();
        let id = registry.insert(client(1));
        registry.set_current(id);
        registry.remove(id);
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.current(), None);
        assert_eq!(registry.find(1), None);
    }

    #[test]
    fn sole_member_is_its_own_successor() {
        let (registry, ids) = registry_of(1);
        assert_eq!(registry.next_after(ids[0]), Some(ids[0]));
    }

    #[test]
    fn stale_current_assignment_is_ignored() {
        let (mut registry, ids) = registry_of(2);
        registry.set_current(ids[0]);
        let stale = ids[1];
        registry.remove(stale);
        registry.set_current(stale);
        assert_eq!(registry.current(), Some(ids[0]));
    }

    #[test]
    fn maximize_toggle_twice_restores_geometry() {
        let screen = Rect::new(0, 0, 1920, 1080);
        let mut c = client(1);
        let before = c.current;

        let maximized = c.toggle_maximized(screen);
        assert_eq!(maximized, screen);
        assert!(c.maximized);

        let restored = c.toggle_maximized(screen);
        assert_eq!(restored, before);
        assert!(!c.maximized);
        assert_eq!(c.current, before);
    }

    #[test]
    fn maximize_restores_to_last_persisted_geometry() {
        let screen = Rect::new(0, 0, 1920, 1080);
        let mut c = client(1);
        let moved = Rect::new(64, 48, 300, 200);
        c.persist_geometry(moved);

        c.toggle_maximized(screen);
        let restored = c.toggle_maximized(screen);
        assert_eq!(restored, moved);
    }

    #[test]
    fn end_to_end_map_unmap_cycle_scenario() {
        let mut registry = ClientRegistry::new();
        assert_eq!(registry.len(), 0);

        // Map request for A
        let a = registry.insert(client(1));
        registry.set_current(a);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.current(), Some(a));

        // Map request for B
        let b = registry.insert(client(2));
        registry.set_current(b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.current(), Some(b));
        assert_eq!(registry.next_after(b), Some(a));

        // Unmap notify for A's frame
        let hit = registry.find(1001).unwrap();
        assert_eq!(hit, a);
        registry.remove(hit);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.current(), Some(b));

        // Cycling with one member stays on it
        assert_eq!(registry.next_after(b), Some(b));
    }
}
