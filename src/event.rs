//! Event handling for X11 events.
//!
//! Contains the event dispatch and handling logic for the window manager,
//! separated from main.rs for maintainability. Interactive move/resize is
//! modal: while a `DragState` is set, motion and release events are routed
//! to it instead of the default handlers, and the release clears it.

use anyhow::Result;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::protocol::Event;

use crate::client::ClientId;
use crate::types::Rect;
use crate::{Wm, MOVE_STEP};

/// Keyboard actions reachable under the activation modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    SpawnTerminal,
    CycleFocus,
    MoveLeft,
    MoveDown,
    MoveUp,
    MoveRight,
    ToggleMaximize,
}

/// An in-progress pointer operation.
///
/// Deltas are always taken against the press point and applied to the
/// geometry captured at grab start, so coalesced motion events cannot
/// cause drift.
#[derive(Debug, Clone, Copy)]
pub enum DragState {
    /// Moving a frame with the pointer
    Move {
        client: ClientId,
        /// Pointer root coordinates at the initiating press
        start_x: i16,
        start_y: i16,
        /// Frame geometry at grab start
        origin: Rect,
    },
    /// Resizing a frame with the pointer
    Resize {
        client: ClientId,
        start_x: i16,
        start_y: i16,
        origin: Rect,
    },
}

/// Frame position after a drag: the grab-start origin shifted by the
/// cumulative pointer delta from the press point.
pub fn dragged_position(origin: Rect, dx: i32, dy: i32) -> (i32, i32) {
    (origin.x + dx, origin.y + dy)
}

/// Frame size after an interactive resize, never collapsing below 1x1.
pub fn resized_dimensions(origin: Rect, dx: i32, dy: i32) -> (u32, u32) {
    let width = (origin.width as i32 + dx).max(1) as u32;
    let height = (origin.height as i32 + dy).max(1) as u32;
    (width, height)
}

impl Wm {
    /// Handle a single X11 event
    pub fn handle_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::MapRequest(e) => {
                log::debug!("MapRequest for window 0x{:x}", e.window);
                self.manage_window(e.window)?;
            }

            Event::ConfigureRequest(e) => {
                log::debug!("ConfigureRequest for window 0x{:x}", e.window);
                self.handle_configure_request(e)?;
            }

            Event::UnmapNotify(e) => {
                log::debug!("UnmapNotify for window 0x{:x}", e.window);
                self.handle_unmap_notify(e)?;
            }

            Event::EnterNotify(e) => {
                self.handle_enter_notify(e)?;
            }

            Event::KeyPress(e) => {
                self.handle_key_press(e)?;
            }

            Event::ButtonPress(e) => {
                self.handle_button_press(e)?;
            }

            Event::ButtonRelease(e) => {
                self.handle_button_release(e)?;
            }

            Event::MotionNotify(e) => {
                self.handle_motion(e)?;
            }

            Event::MappingNotify(e) => {
                // Re-grab keys when keyboard mapping changes
                if e.request != Mapping::POINTER {
                    log::info!("Keyboard mapping changed, re-grabbing keys");
                    self.grab_keys()?;
                }
            }

            Event::RandrScreenChangeNotify(e) => {
                log::info!("Screen geometry changed to {}x{}", e.width, e.height);
                self.screen_size = (e.width, e.height);
            }

            Event::Error(e) => {
                // Asynchronous protocol errors (stale handles, mostly) are
                // diagnostics, never fatal
                log::warn!(
                    "X11 error: {:?} (major {}, bad value 0x{:x})",
                    e.error_kind,
                    e.major_opcode,
                    e.bad_value
                );
            }

            _ => {
                // Ignore other events
            }
        }

        Ok(())
    }

    /// Handle a key press event. The grab already filtered for our
    /// bindings; re-check the modifier and dispatch by keycode.
    fn handle_key_press(&mut self, event: KeyPressEvent) -> Result<()> {
        let state = u16::from(event.state);
        let modmask = u16::from(self.modmask);
        if state & modmask != modmask {
            return Ok(());
        }

        let Some(&action) = self.keymap.get(&event.detail) else {
            return Ok(());
        };
        log::debug!("KeyPress: keycode={} -> {:?}", event.detail, action);

        match action {
            KeyAction::SpawnTerminal => {
                let terminal = self.config.terminal.clone();
                self.children.spawn_shell(&terminal, &self.display_name);
            }
            KeyAction::CycleFocus => self.cycle_focus()?,
            KeyAction::MoveLeft => self.move_client(event.child, -MOVE_STEP, 0)?,
            KeyAction::MoveDown => self.move_client(event.child, 0, MOVE_STEP)?,
            KeyAction::MoveUp => self.move_client(event.child, 0, -MOVE_STEP)?,
            KeyAction::MoveRight => self.move_client(event.child, MOVE_STEP, 0)?,
            KeyAction::ToggleMaximize => self.toggle_maximize()?,
        }

        Ok(())
    }

    /// Handle a button press: start an interactive drag or resize on the
    /// frame under the pointer.
    fn handle_button_press(&mut self, event: ButtonPressEvent) -> Result<()> {
        if self.drag.is_some() {
            return Ok(());
        }
        if event.child == x11rb::NONE {
            return Ok(());
        }
        let Some(id) = self.clients.find(event.child) else {
            return Ok(());
        };

        match event.detail {
            1 => self.begin_interactive(id, &event, false)?,
            3 => self.begin_interactive(id, &event, true)?,
            _ => {}
        }

        Ok(())
    }

    /// Grab the pointer and enter a modal move or resize. If the grab is
    /// refused the operation does not start and no state changes.
    fn begin_interactive(
        &mut self,
        id: ClientId,
        event: &ButtonPressEvent,
        resize: bool,
    ) -> Result<()> {
        let cursor = if resize {
            self.cursor_resize
        } else {
            self.cursor_move
        };

        let status = self
            .conn
            .grab_pointer(
                false,
                self.root,
                EventMask::BUTTON_PRESS
                    | EventMask::BUTTON_RELEASE
                    | EventMask::POINTER_MOTION,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                cursor,
                x11rb::CURRENT_TIME,
            )?
            .reply()?
            .status;

        if status != GrabStatus::SUCCESS {
            log::info!("Pointer grab refused ({:?}), not starting operation", status);
            return Ok(());
        }

        self.activate(id)?;

        let Some(client) = self.clients.get(id) else {
            self.conn.ungrab_pointer(x11rb::CURRENT_TIME)?;
            return Ok(());
        };
        let origin = client.current;

        self.drag = Some(if resize {
            DragState::Resize {
                client: id,
                start_x: event.root_x,
                start_y: event.root_y,
                origin,
            }
        } else {
            DragState::Move {
                client: id,
                start_x: event.root_x,
                start_y: event.root_y,
                origin,
            }
        });

        self.conn.flush()?;
        log::debug!(
            "Started interactive {} on client {:?}",
            if resize { "resize" } else { "move" },
            id
        );
        Ok(())
    }

    /// Handle pointer motion while a modal operation is active
    fn handle_motion(&mut self, event: MotionNotifyEvent) -> Result<()> {
        match self.drag {
            Some(DragState::Move {
                client,
                start_x,
                start_y,
                origin,
            }) => {
                let dx = i32::from(event.root_x) - i32::from(start_x);
                let dy = i32::from(event.root_y) - i32::from(start_y);
                let (x, y) = dragged_position(origin, dx, dy);

                let Some(c) = self.clients.get_mut(client) else {
                    return Ok(());
                };
                c.current.x = x;
                c.current.y = y;
                let frame = c.frame;

                self.conn
                    .configure_window(frame, &ConfigureWindowAux::new().x(x).y(y))?;
                self.conn.flush()?;
            }

            Some(DragState::Resize {
                client,
                start_x,
                start_y,
                origin,
            }) => {
                let dx = i32::from(event.root_x) - i32::from(start_x);
                let dy = i32::from(event.root_y) - i32::from(start_y);
                let (width, height) = resized_dimensions(origin, dx, dy);

                let Some(c) = self.clients.get_mut(client) else {
                    return Ok(());
                };
                c.current.width = width;
                c.current.height = height;
                let (frame, window) = (c.frame, c.window);

                // The inner window always exactly fills the frame
                let size = ConfigureWindowAux::new().width(width).height(height);
                self.conn.configure_window(frame, &size)?;
                self.conn.configure_window(window, &size)?;
                self.conn.flush()?;
            }

            None => {}
        }

        Ok(())
    }

    /// Handle button release: finish the modal operation, release the grab,
    /// and persist the final geometry.
    fn handle_button_release(&mut self, _event: ButtonReleaseEvent) -> Result<()> {
        let Some(drag) = self.drag.take() else {
            return Ok(());
        };

        self.conn.ungrab_pointer(x11rb::CURRENT_TIME)?;
        self.conn.flush()?;

        let (DragState::Move { client, .. } | DragState::Resize { client, .. }) = drag;
        if let Some(c) = self.clients.get_mut(client) {
            let rect = c.current;
            c.persist_geometry(rect);
            log::debug!("Interactive operation finished at {:?}", rect);
        }

        Ok(())
    }

    /// Focus follows mouse, filtering out grab artifacts and
    /// inferior-window transitions.
    fn handle_enter_notify(&mut self, event: EnterNotifyEvent) -> Result<()> {
        if event.mode != NotifyMode::NORMAL || event.detail == NotifyDetail::INFERIOR {
            return Ok(());
        }

        let Some(id) = self
            .clients
            .find(event.event)
            .or_else(|| self.clients.find(event.child))
        else {
            return Ok(());
        };

        let Some(client) = self.clients.get(id) else {
            return Ok(());
        };
        log::debug!("EnterNotify: focusing window 0x{:x}", client.window);
        self.conn
            .set_input_focus(InputFocus::POINTER_ROOT, client.window, x11rb::CURRENT_TIME)?;
        self.conn.flush()?;
        self.clients.set_current(id);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_position_is_origin_plus_cumulative_delta() {
        let origin = Rect::new(100, 50, 400, 300);
        assert_eq!(dragged_position(origin, 30, -20), (130, 30));
        // Only the latest delta matters, no matter how many motion events
        // were coalesced before it
        assert_eq!(dragged_position(origin, 0, 0), (100, 50));
        assert_eq!(dragged_position(origin, -200, -100), (-100, -50));
    }

    #[test]
    fn resize_never_collapses_below_one_pixel() {
        let origin = Rect::new(0, 0, 400, 300);
        assert_eq!(resized_dimensions(origin, 50, 25), (450, 325));
        assert_eq!(resized_dimensions(origin, -399, -299), (1, 1));
        assert_eq!(resized_dimensions(origin, -1000, -1000), (1, 1));
    }

    #[test]
    fn resize_axes_are_independent() {
        let origin = Rect::new(0, 0, 400, 300);
        assert_eq!(resized_dimensions(origin, -1000, 10), (1, 310));
        assert_eq!(resized_dimensions(origin, 10, -1000), (410, 1));
    }
}
