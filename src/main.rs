//! pswm - a reparenting floating window manager for X11.
//!
//! Every managed top-level window is wrapped in a decoration frame; a
//! circular client registry tracks the frames and drives focus cycling,
//! keyboard moves, maximize, and pointer-driven move/resize, all from
//! server-delivered events.

mod client;
mod config;
mod event;
mod spawn;
mod types;

use std::collections::HashMap;

use anyhow::{Context, Result};
use clap::Parser;
use x11rb::connection::Connection;
use x11rb::protocol::randr::{self, ConnectionExt as _};
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use client::{Client, ClientId, ClientRegistry};
use config::Config;
use event::{DragState, KeyAction};
use spawn::SpawnedChildren;
use types::Rect;

/// Keyboard move step in pixels
pub const MOVE_STEP: i32 = 16;

// Cursor-font glyphs for the interactive operations
const XC_FLEUR: u16 = 52;
const XC_SIZING: u16 = 120;

// Keysyms for the fixed bindings, all taken under the activation modifier
const XK_RETURN: u32 = 0xff0d;
const XK_TAB: u32 = 0xff09;
const XK_H: u32 = 0x68;
const XK_J: u32 = 0x6a;
const XK_K: u32 = 0x6b;
const XK_L: u32 = 0x6c;
const XK_X: u32 = 0x78;

const KEYBINDINGS: [(u32, KeyAction); 7] = [
    (XK_RETURN, KeyAction::SpawnTerminal),
    (XK_TAB, KeyAction::CycleFocus),
    (XK_H, KeyAction::MoveLeft),
    (XK_J, KeyAction::MoveDown),
    (XK_K, KeyAction::MoveUp),
    (XK_L, KeyAction::MoveRight),
    (XK_X, KeyAction::ToggleMaximize),
];

/// pswm - a reparenting floating window manager for X11
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// X display number to manage (e.g. 1 for :1); defaults to $DISPLAY
    display: Option<u16>,
}

/// The main window manager state
struct Wm {
    conn: RustConnection,
    root: Window,
    /// DISPLAY value handed to spawned children
    display_name: String,
    /// User configuration
    config: Config,
    /// Activation modifier resolved from the config
    modmask: ModMask,
    /// All managed clients
    clients: ClientRegistry,
    /// Current screen dimensions, refreshed on RandR screen changes
    screen_size: (u16, u16),
    /// Cursor shown during interactive moves
    cursor_move: Cursor,
    /// Cursor shown during interactive resizes
    cursor_resize: Cursor,
    /// Keycode -> action table, rebuilt whenever keys are grabbed
    keymap: HashMap<Keycode, KeyAction>,
    /// In-progress pointer operation, if any
    drag: Option<DragState>,
    /// Detached children awaiting reaping
    children: SpawnedChildren,
}

impl Wm {
    /// Connect to X11 and set up the window manager
    fn new(display: Option<u16>) -> Result<Self> {
        let display_arg = display.map(|n| format!(":{}", n));
        if display_arg.is_none() {
            log::info!("No display argument, using $DISPLAY");
        }

        let (conn, screen_num) = RustConnection::connect(display_arg.as_deref())
            .context("Failed to connect to X11 server")?;

        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let screen_size = (screen.width_in_pixels, screen.height_in_pixels);

        log::info!(
            "Connected to X11, screen {}, root window 0x{:x}, {}x{}",
            screen_num,
            root,
            screen_size.0,
            screen_size.1
        );

        let display_name = display_arg.unwrap_or_else(|| {
            std::env::var("DISPLAY").unwrap_or_else(|_| ":0".to_string())
        });

        let config = Config::load();
        let modmask = config.modmask();

        let (cursor_move, cursor_resize) =
            Self::create_cursors(&conn).context("Failed to create cursors")?;

        Ok(Self {
            conn,
            root,
            display_name,
            config,
            modmask,
            clients: ClientRegistry::new(),
            screen_size,
            cursor_move,
            cursor_resize,
            keymap: HashMap::new(),
            drag: None,
            children: SpawnedChildren::new(),
        })
    }

    /// Load the move and resize glyphs from the standard cursor font
    fn create_cursors(conn: &RustConnection) -> Result<(Cursor, Cursor)> {
        let font = conn.generate_id()?;
        conn.open_font(font, b"cursor")?;

        let make = |glyph: u16| -> Result<Cursor> {
            let cursor = conn.generate_id()?;
            conn.create_glyph_cursor(
                cursor,
                font,
                font,
                glyph,
                glyph + 1,
                0,
                0,
                0,
                u16::MAX,
                u16::MAX,
                u16::MAX,
            )?;
            Ok(cursor)
        };

        let cursor_move = make(XC_FLEUR)?;
        let cursor_resize = make(XC_SIZING)?;
        conn.close_font(font)?;
        conn.flush()?;

        Ok((cursor_move, cursor_resize))
    }

    /// Become the window manager by requesting SubstructureRedirect on root
    fn become_wm(&self) -> Result<()> {
        let event_mask = EventMask::SUBSTRUCTURE_REDIRECT
            | EventMask::SUBSTRUCTURE_NOTIFY
            | EventMask::STRUCTURE_NOTIFY;

        let result = self.conn.change_window_attributes(
            self.root,
            &ChangeWindowAttributesAux::new().event_mask(event_mask),
        );

        self.conn.flush()?;

        if let Err(e) = result?.check() {
            anyhow::bail!("Another window manager is already running! Error: {}", e);
        }

        // Screen-geometry changes feed the maximize dimensions
        self.conn
            .randr_select_input(self.root, randr::NotifyMask::SCREEN_CHANGE)?;
        self.conn.flush()?;

        log::info!("Successfully became the window manager");
        Ok(())
    }

    /// Grab our key bindings and rebuild the keycode -> action table
    fn grab_keys(&mut self) -> Result<()> {
        // 0 = AnyKey
        self.conn.ungrab_key(0, self.root, ModMask::ANY)?;

        let setup = self.conn.setup();
        let min_keycode = setup.min_keycode;
        let max_keycode = setup.max_keycode;

        let mapping = self
            .conn
            .get_keyboard_mapping(min_keycode, max_keycode - min_keycode + 1)?
            .reply()?;
        let keysyms_per_keycode = mapping.keysyms_per_keycode as usize;

        self.keymap.clear();
        for (keysym, action) in KEYBINDINGS {
            let keycode = (min_keycode..=max_keycode).find(|&code| {
                let idx = (code - min_keycode) as usize * keysyms_per_keycode;
                mapping.keysyms.get(idx).copied() == Some(keysym)
            });

            let Some(keycode) = keycode else {
                log::warn!("No keycode for keysym 0x{:x}, skipping {:?}", keysym, action);
                continue;
            };

            self.grab_key(keycode, self.modmask)?;
            self.keymap.insert(keycode, action);
            log::debug!("Grabbed {:?} (keycode {})", action, keycode);
        }

        self.conn.flush()?;
        Ok(())
    }

    /// Grab a single key combination, tolerating NumLock/CapsLock states
    fn grab_key(&self, keycode: Keycode, modifiers: ModMask) -> Result<()> {
        let numlock = ModMask::M2;
        let capslock = ModMask::LOCK;

        for extra_mods in [
            ModMask::from(0u16),
            capslock,
            numlock,
            capslock | numlock,
        ] {
            self.conn.grab_key(
                false,
                self.root,
                modifiers | extra_mods,
                keycode,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )?;
        }

        Ok(())
    }

    /// Grab the drag and resize buttons under the activation modifier
    fn grab_buttons(&self) -> Result<()> {
        self.conn
            .ungrab_button(ButtonIndex::ANY, self.root, ModMask::ANY)?;

        let numlock = ModMask::M2;
        let capslock = ModMask::LOCK;

        for button in [ButtonIndex::M1, ButtonIndex::M3] {
            for extra_mods in [
                ModMask::from(0u16),
                capslock,
                numlock,
                capslock | numlock,
            ] {
                self.conn.grab_button(
                    false,
                    self.root,
                    EventMask::BUTTON_PRESS
                        | EventMask::BUTTON_RELEASE
                        | EventMask::POINTER_MOTION,
                    GrabMode::ASYNC,
                    GrabMode::ASYNC,
                    x11rb::NONE,
                    x11rb::NONE,
                    button,
                    self.modmask | extra_mods,
                )?;
            }
        }

        self.conn.flush()?;
        Ok(())
    }

    /// Wrap a window in a new frame and start managing it.
    ///
    /// The protocol ordering here is deliberate: map window, map frame,
    /// reparent, raise, focus. Reordering causes flicker or focus loss.
    fn manage_window(&mut self, window: Window) -> Result<()> {
        if self.clients.find(window).is_some() {
            log::debug!("MapRequest for already managed window 0x{:x}", window);
            return Ok(());
        }

        let geom = self.conn.get_geometry(window)?.reply()?;
        let rect = Rect::new(
            geom.x as i32,
            geom.y as i32,
            geom.width.max(1) as u32,
            geom.height.max(1) as u32,
        );

        let frame = self.conn.generate_id()?;
        self.conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            frame,
            self.root,
            rect.x as i16,
            rect.y as i16,
            rect.width as u16,
            rect.height as u16,
            self.config.border_width,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new().override_redirect(1).event_mask(
                EventMask::SUBSTRUCTURE_REDIRECT
                    | EventMask::SUBSTRUCTURE_NOTIFY
                    | EventMask::BUTTON_PRESS
                    | EventMask::ENTER_WINDOW,
            ),
        )?;

        let id = self.clients.insert(Client::new(window, frame, rect));
        self.clients.set_current(id);

        self.conn.map_window(window)?;
        self.conn.map_window(frame)?;
        self.conn.reparent_window(window, frame, 0, 0)?;
        self.conn.configure_window(
            frame,
            &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
        )?;
        self.conn
            .set_input_focus(InputFocus::POINTER_ROOT, window, x11rb::CURRENT_TIME)?;
        self.conn.flush()?;

        log::info!(
            "Managing window 0x{:x} in frame 0x{:x} at {:?} ({} clients)",
            window,
            frame,
            rect,
            self.clients.len()
        );
        Ok(())
    }

    /// Apply a client's configure request to its frame, or pass it through
    /// for windows we don't manage.
    fn handle_configure_request(&mut self, event: ConfigureRequestEvent) -> Result<()> {
        let Some(id) = self.clients.find(event.window) else {
            // Not ours; let the window have what it asked for
            let aux = ConfigureWindowAux::from_configure_request(&event);
            self.conn.configure_window(event.window, &aux)?;
            self.conn.flush()?;
            return Ok(());
        };

        let Some(client) = self.clients.get_mut(id) else {
            return Ok(());
        };

        // Only the requested fields change, and they land on the frame. The
        // inner window stays origin-anchored and frame-sized.
        let mut frame_aux = ConfigureWindowAux::new();
        let mut resize_inner = false;

        if event.value_mask.contains(ConfigWindow::X) {
            frame_aux = frame_aux.x(i32::from(event.x));
            client.current.x = i32::from(event.x);
        }
        if event.value_mask.contains(ConfigWindow::Y) {
            frame_aux = frame_aux.y(i32::from(event.y));
            client.current.y = i32::from(event.y);
        }
        if event.value_mask.contains(ConfigWindow::WIDTH) {
            let width = u32::from(event.width.max(1));
            frame_aux = frame_aux.width(width);
            client.current.width = width;
            resize_inner = true;
        }
        if event.value_mask.contains(ConfigWindow::HEIGHT) {
            let height = u32::from(event.height.max(1));
            frame_aux = frame_aux.height(height);
            client.current.height = height;
            resize_inner = true;
        }

        let (frame, window, current) = (client.frame, client.window, client.current);
        self.conn.configure_window(frame, &frame_aux)?;
        if resize_inner {
            self.conn.configure_window(
                window,
                &ConfigureWindowAux::new()
                    .width(current.width)
                    .height(current.height),
            )?;
        }
        self.conn.flush()?;

        Ok(())
    }

    /// Tear down a client whose window went away.
    fn handle_unmap_notify(&mut self, event: UnmapNotifyEvent) -> Result<()> {
        let Some(id) = self.clients.find(event.window) else {
            return Ok(());
        };
        let Some(client) = self.clients.get(id) else {
            return Ok(());
        };

        // Reparenting generates UnmapNotify events of its own; only a
        // notification reported to the frame is a genuine client unmap.
        if event.event != client.frame {
            return Ok(());
        }

        let (frame, position) = (client.frame, (client.current.x, client.current.y));
        self.conn.unmap_window(frame)?;
        self.conn
            .reparent_window(frame, self.root, position.0 as i16, position.1 as i16)?;
        self.conn.destroy_window(frame)?;
        self.conn.flush()?;

        self.clients.remove(id);
        log::info!(
            "Unmanaged window 0x{:x} ({} clients)",
            event.window,
            self.clients.len()
        );
        Ok(())
    }

    /// Raise a client's frame, focus its window, and make it current
    fn activate(&mut self, id: ClientId) -> Result<()> {
        let Some(client) = self.clients.get(id) else {
            return Ok(());
        };
        let (frame, window) = (client.frame, client.window);

        self.conn.configure_window(
            frame,
            &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
        )?;
        self.conn
            .set_input_focus(InputFocus::POINTER_ROOT, window, x11rb::CURRENT_TIME)?;
        self.clients.set_current(id);
        Ok(())
    }

    /// Advance the focus cursor to the circular successor
    fn cycle_focus(&mut self) -> Result<()> {
        let Some(current) = self.clients.current() else {
            return Ok(());
        };
        let Some(next) = self.clients.next_after(current) else {
            return Ok(());
        };

        self.activate(next)?;
        self.conn.flush()?;
        Ok(())
    }

    /// Move the frame under the keyboard target by a fixed step and persist
    /// the new position as the restore target.
    fn move_client(&mut self, target: Window, dx: i32, dy: i32) -> Result<()> {
        if target == x11rb::NONE {
            return Ok(());
        }
        let Some(id) = self.clients.find(target) else {
            return Ok(());
        };
        let Some(client) = self.clients.get_mut(id) else {
            return Ok(());
        };

        let moved = client.current.translated(dx, dy);
        client.persist_geometry(moved);
        let frame = client.frame;

        self.conn
            .configure_window(frame, &ConfigureWindowAux::new().x(moved.x).y(moved.y))?;
        self.activate(id)?;
        self.conn.flush()?;
        Ok(())
    }

    /// Toggle the current client between maximized and its recorded geometry
    fn toggle_maximize(&mut self) -> Result<()> {
        let Some(id) = self.clients.current() else {
            return Ok(());
        };
        let (width, height) = self.screen_size;
        let screen = Rect::new(0, 0, u32::from(width), u32::from(height));

        let Some(client) = self.clients.get_mut(id) else {
            return Ok(());
        };
        let rect = client.toggle_maximized(screen);
        let (frame, window) = (client.frame, client.window);

        self.conn.configure_window(
            frame,
            &ConfigureWindowAux::new()
                .x(rect.x)
                .y(rect.y)
                .width(rect.width)
                .height(rect.height),
        )?;
        self.conn.configure_window(
            window,
            &ConfigureWindowAux::new()
                .width(rect.width)
                .height(rect.height),
        )?;
        self.activate(id)?;
        self.conn.flush()?;
        Ok(())
    }

    /// Main event loop: the blocking event read is the only suspension
    /// point in the process.
    fn run(&mut self) -> Result<()> {
        log::info!("Entering event loop");

        loop {
            let event = self.conn.wait_for_event()?;
            if let Err(e) = self.handle_event(event) {
                log::error!("Error handling event: {}", e);
            }
            self.children.reap();
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::info!("Starting pswm");

    let mut wm = Wm::new(args.display)?;
    wm.become_wm()?;
    wm.grab_keys()?;
    wm.grab_buttons()?;
    wm.run()
}
