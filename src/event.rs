//! Event-driven state machine (C4): the dispatch table and handlers that
//! translate the X11 event stream into mutations on `model::World`,
//! preserving the invariants `model.rs` documents.

use std::time::Instant;

use x11::xlib::{self, Window, XEvent};

use crate::bar::{self, Renderer, Scheme};
use crate::config::{self, Action, ClickRegion, Settings, StackDirection};
use crate::geometry::{apply_size_hints, HintContext, Rect};
use crate::layout::LayoutKind;
use crate::model::{Client, World};
use crate::spawn;
use crate::xconn::XConn;

pub struct Bar {
    pub win: Window,
}

/// Top-level manager state: the model plus the handles the event loop
/// needs that don't belong in `World` (connection, bars, settings, running
/// flag). Kept as one struct the way the teacher's `Rdwm` bundles display,
/// root and client map together.
pub struct Manager<R: Renderer> {
    pub conn: XConn,
    pub world: World,
    pub settings: Settings,
    pub renderer: R,
    pub bars: Vec<Bar>,
    pub running: bool,
    status: String,
    drag: Option<DragState>,
}

struct DragState {
    win: Window,
    kind: DragKind,
    start_root_x: i32,
    start_root_y: i32,
    orig: Rect,
    last_motion: i64,
}

enum DragKind {
    Move,
    Resize,
}

impl<R: Renderer> Manager<R> {
    pub fn new(conn: XConn, settings: Settings, renderer: R) -> Self {
        let screens = conn.screens();
        let bar_height = renderer.bar_height();
        let mut world = World::new(screens);
        for m in &mut world.monitors {
            m.bar_y = if m.top_bar { m.screen.y } else { m.screen.bottom() - bar_height };
            m.window_area.y = if m.top_bar { m.screen.y + bar_height } else { m.screen.y };
            m.window_area.h = m.screen.h - bar_height;
        }

        let bars = world
            .monitors
            .iter()
            .map(|m| Bar {
                win: bar::create_bar_window(&conn, m.screen.x, m.bar_y, m.screen.w, bar_height),
            })
            .collect();

        Manager {
            conn,
            world,
            settings,
            renderer,
            bars,
            running: true,
            status: format!("rdwm-{}", env!("CARGO_PKG_VERSION")),
            drag: None,
        }
    }

    pub fn setup(&mut self) {
        spawn::install_sigchld_handler();
        self.conn.select_root_input();
        self.conn.set_supported();
        self.grab_keys();
        self.world.focus(None);
        self.update_status();
    }

    /// `updatestatus`: refreshes the root window's `WM_NAME` into the
    /// status-text area of the selected monitor's bar, falling back to the
    /// version string when no status text is set.
    fn update_status(&mut self) {
        self.status = self
            .conn
            .text_property(self.conn.root, xlib::XA_WM_NAME)
            .unwrap_or_else(|| format!("rdwm-{}", env!("CARGO_PKG_VERSION")));
        self.draw_bars();
    }

    pub fn scan(&mut self) {
        for win in self.conn.query_tree() {
            if self.conn.transient_for(win).is_some() {
                continue;
            }
            if let Some(wa) = self.conn.window_attributes(win) {
                if wa.override_redirect == 0
                    && (wa.map_state == xlib::IsViewable)
                {
                    self.manage(win, wa);
                }
            }
        }
    }

    pub fn run(&mut self) {
        self.conn.sync();
        while self.running {
            let mut ev: XEvent = unsafe { std::mem::zeroed() };
            unsafe { xlib::XNextEvent(self.conn.display, &mut ev) };
            self.dispatch(ev);
        }
    }

    fn dispatch(&mut self, ev: XEvent) {
        let kind = unsafe { ev.get_type() };
        log::trace!("event {kind}");
        match kind {
            xlib::KeyPress => self.on_key_press(unsafe { &ev.key }),
            xlib::ButtonPress => self.on_button_press(unsafe { &ev.button }),
            xlib::MotionNotify => self.on_motion_notify(unsafe { &ev.motion }),
            xlib::EnterNotify => self.on_enter_notify(unsafe { &ev.crossing }),
            xlib::FocusIn => self.on_focus_in(unsafe { &ev.focus_change }),
            xlib::Expose => self.on_expose(unsafe { &ev.expose }),
            xlib::DestroyNotify => self.on_destroy_notify(unsafe { &ev.destroy_window }),
            xlib::UnmapNotify => self.on_unmap_notify(unsafe { &ev.unmap }),
            xlib::MapRequest => self.on_map_request(unsafe { &ev.map_request }),
            xlib::ConfigureRequest => self.on_configure_request(unsafe { &ev.configure_request }),
            xlib::ConfigureNotify => self.on_configure_notify(unsafe { &ev.configure }),
            xlib::PropertyNotify => self.on_property_notify(unsafe { &ev.property }),
            xlib::ClientMessage => self.on_client_message(unsafe { &ev.client_message }),
            xlib::MappingNotify => self.on_mapping_notify(unsafe { &mut { ev }.mapping }),
            _ => {}
        }
    }

    // ---- model <-> X plumbing -------------------------------------------------

    fn arrange(&mut self, mon: usize) {
        self.show_hide(mon);
        let moves = self.world.arrange(mon, self.settings.border_px, self.settings.window_gap);
        for (win, rect) in moves {
            self.apply_resize(win, rect, false);
        }
        self.restack(mon);
    }

    fn arrange_all(&mut self) {
        for mon in 0..self.world.monitors.len() {
            self.arrange(mon);
        }
    }

    /// `showhide`: moves invisible clients off-screen and repositions
    /// visible floating/unarranged ones back to their stored geometry.
    fn show_hide(&mut self, mon: usize) {
        let tagset = self.world.monitors[mon].cur_tagset();
        let floating_layout = self.world.monitors[mon].cur_layout().is_floating();
        let wins: Vec<Window> = self.world.monitors[mon].stack.clone();
        for win in wins {
            let Some(c) = self.world.clients.get(&win) else { continue };
            if c.is_visible(tagset) {
                let rect = c.rect();
                let bw = c.border_width;
                let is_floating = c.is_floating;
                let is_fullscreen = c.is_fullscreen;
                self.conn.configure_window(win, rect, bw);
                if (floating_layout || is_floating) && !is_fullscreen {
                    self.apply_resize(win, rect, false);
                }
            } else {
                let w = c.w + 2 * c.border_width;
                let y = c.y;
                unsafe {
                    xlib::XMoveWindow(self.conn.display, win, -2 * w, y);
                }
            }
        }
    }

    /// `restack`: raises the selected client if floating/no-arrange,
    /// otherwise chains every non-floating visible client below the bar
    /// window in stack order, then drains queued `EnterNotify` events so
    /// the restacking's pointer motion doesn't race a fresh focus change.
    fn restack(&mut self, mon: usize) {
        self.draw_bar(mon);
        let Some(sel) = self.world.monitors[mon].selected else { return };
        let Some(c) = self.world.clients.get(&sel) else { return };
        let floating_layout = self.world.monitors[mon].cur_layout().is_floating();
        if c.is_floating || floating_layout {
            self.conn.raise_window(sel);
        }
        if !floating_layout {
            let tagset = self.world.monitors[mon].cur_tagset();
            let mut sibling = self.bars[mon].win;
            for win in self.world.monitors[mon].stack.clone() {
                let c = &self.world.clients[&win];
                if !c.is_floating && c.is_visible(tagset) {
                    self.conn.stack_below(win, sibling);
                    sibling = win;
                }
            }
        }
        self.conn.sync();
        self.conn.drain_enter_notify();
    }

    fn apply_resize(&mut self, win: Window, req: Rect, interactive: bool) {
        let Some(c) = self.world.clients.get(&win) else { return };
        let mon = c.mon;
        let m = &self.world.monitors[mon];
        let honour_hints = self.settings.resize_hints
            && (c.is_floating || m.cur_layout().is_floating());
        let ctx = HintContext {
            current: c.rect(),
            border_width: c.border_width,
            hints: c.hints,
            honour_hints,
            screen: Rect::new(0, 0, i32::MAX / 2, i32::MAX / 2),
            monitor_window_area: m.window_area,
            bar_height: self.renderer.bar_height(),
        };
        let (result, changed) = apply_size_hints(&ctx, req, interactive);
        if !changed {
            return;
        }
        self.world.commit_geometry(win, result);
        let bw = self.world.clients[&win].border_width;
        self.conn.configure_window(win, result, bw);
        self.conn.send_configure_notify(win, result, bw);
    }

    // ---- manage / unmanage -----------------------------------------------------

    fn manage(&mut self, win: Window, wa: xlib::XWindowAttributes) {
        log::debug!("managing window {win}");
        let trans_mon = self
            .conn
            .transient_for(win)
            .and_then(|t| self.world.clients.get(&t))
            .map(|c| (c.mon, c.tags));

        let mon = trans_mon.map(|(m, _)| m).unwrap_or(self.world.sel_mon);
        let tags_from_transient = trans_mon.map(|(_, t)| t);

        let (class, instance) = self.conn.class_hint(win);
        let name = self
            .conn
            .text_property(win, self.conn.net.wm_name)
            .unwrap_or_else(|| "broken".into());

        let mut client = Client {
            win,
            name,
            class: class.clone(),
            instance: instance.clone(),
            x: wa.x,
            y: wa.y,
            w: wa.width,
            h: wa.height,
            old_x: wa.x,
            old_y: wa.y,
            old_w: wa.width,
            old_h: wa.height,
            border_width: self.settings.border_px,
            old_border_width: wa.border_width,
            hints: self.conn.size_hints(win),
            tags: 0,
            is_fixed: false,
            is_floating: false,
            is_urgent: false,
            never_focus: false,
            old_state: false,
            is_fullscreen: false,
            mon,
        };
        client.is_fixed = client.hints.is_fixed();

        if let Some(tags) = tags_from_transient {
            client.tags = tags;
        } else {
            self.apply_rules(&mut client);
        }
        let tagmask = config::tag_mask();
        if client.tags & tagmask == 0 {
            client.tags = self.world.monitors[client.mon].cur_tagset();
        }

        let m = self.world.monitors[client.mon].window_area;
        if client.x + client.w > m.x + m.w {
            client.x = m.x + m.w - client.w;
        }
        if client.y + client.h > m.y + m.h {
            client.y = m.y + m.h - client.h;
        }
        client.x = client.x.max(m.x);
        client.y = client.y.max(m.y);

        self.conn.configure_window(client.win, client.rect(), client.border_width);
        self.conn.set_border_colour(client.win, self.scheme_pixel(Scheme::Normal, "border"));

        let is_transient = self.conn.transient_for(win).is_some();
        if !client.is_floating {
            client.is_floating = is_transient || client.is_fixed;
            client.old_state = client.is_floating;
        }

        let mon = client.mon;
        self.world.clients.insert(win, client);
        self.apply_window_type(win);
        self.apply_wm_hints(win);

        unsafe {
            xlib::XSelectInput(
                self.conn.display,
                win,
                xlib::EnterWindowMask
                    | xlib::FocusChangeMask
                    | xlib::PropertyChangeMask
                    | xlib::StructureNotifyMask,
            );
        }
        self.grab_buttons(win, false);

        if self.world.clients[&win].is_floating {
            self.conn.raise_window(win);
        }
        self.world.attach(mon, win);
        self.world.attach_stack(mon, win);
        self.conn.set_client_state(win, 1); // NormalState

        if mon == self.world.sel_mon {
            if let Some(prev) = self.world.monitors[self.world.sel_mon].selected {
                self.unfocus(prev, false);
            }
        }
        self.world.monitors[mon].selected = Some(win);
        self.arrange(mon);
        unsafe { xlib::XMapWindow(self.conn.display, win) };
        let (_, focused) = self.world.focus(None);
        self.apply_focus(focused);
    }

    fn apply_rules(&mut self, client: &mut Client) {
        client.is_floating = false;
        client.tags = 0;
        let mut target_mon = None;
        for rule in config::RULES {
            let title_ok = rule.title.map_or(true, |t| client.name.contains(t));
            let class_ok = rule.class.map_or(true, |c| client.class.contains(c));
            let inst_ok = rule.instance.map_or(true, |i| client.instance.contains(i));
            if title_ok && class_ok && inst_ok {
                client.is_floating = rule.floating;
                client.tags |= rule.tags;
                if rule.monitor >= 0 {
                    target_mon = Some(rule.monitor as usize);
                }
            }
        }
        if let Some(m) = target_mon {
            if m < self.world.monitors.len() {
                client.mon = m;
            }
        }
    }

    /// `updatewindowtype` (§0.1): forces fullscreen/dialog-floating state.
    fn apply_window_type(&mut self, win: Window) {
        if self.conn.wm_state_fullscreen_requested(win) {
            self.set_fullscreen(win, true);
        }
        if self.conn.wm_window_type(win) == Some(self.conn.net.wm_window_type_dialog) {
            if let Some(c) = self.world.clients.get_mut(&win) {
                c.is_floating = true;
            }
        }
    }

    /// `updatewmhints` (§0.1): urgency clears immediately if already
    /// selected, otherwise is set from the hint.
    fn apply_wm_hints(&mut self, win: Window) {
        let Some(urgent) = self.conn.wm_hints_urgent(win) else { return };
        let mon = self.world.clients[&win].mon;
        let is_selected = self.world.monitors[mon].selected == Some(win);
        if let Some(c) = self.world.clients.get_mut(&win) {
            c.is_urgent = if is_selected { false } else { urgent };
            c.never_focus = false;
        }
    }

    fn unmanage(&mut self, win: Window, _destroyed: bool) {
        let Some(c) = self.world.clients.get(&win) else { return };
        let mon = c.mon;
        self.world.detach(win);
        self.world.detach_stack(win);
        self.world.clients.remove(&win);
        if self.world.monitors[mon].selected.is_none() {
            let (_, focused) = self.world.focus(None);
            self.apply_focus(focused);
        }
        self.update_client_list();
        self.arrange(mon);
    }

    fn update_client_list(&self) {
        unsafe {
            xlib::XDeleteProperty(self.conn.display, self.conn.root, self.conn.net.client_list);
        }
        for win in self.world.clients.keys() {
            unsafe {
                xlib::XChangeProperty(
                    self.conn.display,
                    self.conn.root,
                    self.conn.net.client_list,
                    xlib::XA_WINDOW,
                    32,
                    xlib::PropModeAppend,
                    win as *const Window as *const u8,
                    1,
                );
            }
        }
    }

    // ---- focus ------------------------------------------------------------

    fn unfocus(&mut self, win: Window, set_focus: bool) {
        self.grab_buttons(win, false);
        self.conn.set_border_colour(win, self.scheme_pixel(Scheme::Normal, "border"));
        if set_focus {
            unsafe {
                xlib::XSetInputFocus(self.conn.display, self.conn.root, xlib::RevertToPointerRoot, xlib::CurrentTime);
            }
        }
    }

    fn apply_focus(&mut self, win: Option<Window>) {
        if let Some(w) = win {
            self.grab_buttons(w, true);
            self.conn.set_border_colour(w, self.scheme_pixel(Scheme::Selected, "border"));
            // `focus`: clears a pending urgency hint on whatever becomes the
            // selected client. World::focus already drops is_urgent in the
            // model; this mirrors that onto the client's WM_HINTS on the
            // server, where clearing an already-clear hint is a no-op.
            self.conn.clear_urgent_hint(w);
            let never_focus = self.world.clients[&w].never_focus;
            if !never_focus {
                self.conn.set_input_focus(w);
                unsafe {
                    xlib::XChangeProperty(
                        self.conn.display,
                        self.conn.root,
                        self.conn.net.active_window,
                        xlib::XA_WINDOW,
                        32,
                        xlib::PropModeReplace,
                        &w as *const Window as *const u8,
                        1,
                    );
                }
            }
            self.conn.send_protocol(w, self.conn.wm.take_focus);
        } else {
            unsafe {
                xlib::XSetInputFocus(self.conn.display, self.conn.root, xlib::RevertToPointerRoot, xlib::CurrentTime);
                xlib::XDeleteProperty(self.conn.display, self.conn.root, self.conn.net.active_window);
            }
        }
        self.draw_bars();
    }

    fn scheme_pixel(&self, scheme: Scheme, which: &str) -> u64 {
        let cs = match scheme {
            Scheme::Normal => &self.settings.normal,
            Scheme::Selected => &self.settings.selected,
        };
        let hex = match which {
            "border" => &cs.border,
            "fg" => &cs.fg,
            _ => &cs.bg,
        };
        self.conn.alloc_colour(hex)
    }

    fn grab_keys(&mut self) {
        self.conn.update_numlock_mask();
        self.conn.ungrab_all_keys();
        for k in config::KEYS.iter() {
            self.conn.grab_key(k.keysym, k.modifiers);
        }
    }

    fn grab_buttons(&self, win: Window, focused: bool) {
        self.conn.ungrab_all_buttons(win);
        if !focused {
            self.conn.grab_button(win, xlib::AnyButton as u32, xlib::AnyModifier, true);
        }
        for b in config::BUTTONS.iter() {
            if b.click == ClickRegion::ClientWin {
                self.conn.grab_button(win, b.button, b.modifiers, false);
            }
        }
    }

    // ---- bar ---------------------------------------------------------------

    fn draw_bars(&mut self) {
        for mon in 0..self.world.monitors.len() {
            self.draw_bar(mon);
        }
    }

    fn draw_bar(&mut self, mon: usize) {
        if !self.world.monitors[mon].show_bar {
            return;
        }
        let bar_win = self.bars[mon].win;
        let m = &self.world.monitors[mon];
        let is_selected = mon == self.world.sel_mon;

        let mut occ = 0u32;
        let mut urg = 0u32;
        for win in &m.order {
            let c = &self.world.clients[win];
            occ |= c.tags;
            if c.is_urgent {
                urg |= c.tags;
            }
        }
        let sel_tags = m.selected.map(|w| self.world.clients[&w].tags).unwrap_or(0);

        let box_size = (self.renderer.bar_height() / 6 + 2).max(4);
        let mut x = 0;
        for (i, name) in config::TAGS.iter().enumerate() {
            let bit = 1u32 << i;
            let scheme = if m.cur_tagset() & bit != 0 { Scheme::Selected } else { Scheme::Normal };
            let urgent = urg & bit != 0;
            let w = self.renderer.text_width(name);
            self.renderer.draw_text(bar_win, x, w, name, scheme, urgent);
            // Occupancy square: filled iff some client carries this tag,
            // inverted (opposite scheme) when urgent or owned by the
            // selected client on the selected monitor.
            let selected_owns = is_selected && sel_tags & bit != 0;
            let box_scheme = if urgent || selected_owns { Scheme::Selected } else { Scheme::Normal };
            self.renderer.draw_rect(bar_win, x + 1, 1, box_size, box_size, occ & bit != 0, box_scheme);
            x += w;
        }

        let lt_symbol = m.lt_symbol;
        let lt_w = self.renderer.text_width(lt_symbol);
        self.renderer.draw_text(bar_win, x, lt_w, lt_symbol, Scheme::Normal, false);
        x += lt_w;

        if is_selected {
            let status = self.status.clone();
            let status_w = self.renderer.text_width(&status).max(1);
            let sx = (m.screen.w - status_w).max(x);
            self.renderer.draw_text(bar_win, sx, status_w, &status, Scheme::Normal, false);
        }

        if let Some(sel) = m.selected {
            let title = self.world.clients[&sel].name.clone();
            let is_floating = self.world.clients[&sel].is_floating;
            let scheme = if is_selected { Scheme::Selected } else { Scheme::Normal };
            let w = m.screen.w - x;
            self.renderer.draw_text(bar_win, x, w, &title, scheme, false);
            // Small indicator square next to the title marking a floating
            // selected client (dwm's isfloating/isfixed box on the title cell).
            self.renderer.draw_rect(bar_win, x + 1, 1, box_size, box_size, is_floating, scheme);
        }
    }

    // ---- handlers -----------------------------------------------------------

    fn on_key_press(&mut self, ev: &xlib::XKeyEvent) {
        let keysym = unsafe { xlib::XKeycodeToKeysym(self.conn.display, ev.keycode as u8, 0) };
        let cleanmask = ev.state & !(xlib::LockMask | self.conn.numlock_mask) & (xlib::ShiftMask | xlib::ControlMask | xlib::Mod1Mask | config::MODKEY);
        for k in config::KEYS.iter() {
            if keysym == k.keysym && k.modifiers == cleanmask {
                self.dispatch_action(k.action);
                break;
            }
        }
    }

    fn on_button_press(&mut self, ev: &xlib::XButtonEvent) {
        let mon = self.window_to_mon(ev.window);
        if mon != self.world.sel_mon {
            if let Some(sel) = self.world.monitors[self.world.sel_mon].selected {
                self.unfocus(sel, true);
            }
            self.world.sel_mon = mon;
            let (_, focused) = self.world.focus(None);
            self.apply_focus(focused);
        }

        let mut clicked_tag = 0u32;
        let click = if ev.window == self.bars[mon].win {
            let m = &self.world.monitors[mon];
            let widths: Vec<i32> = config::TAGS.iter().map(|t| self.renderer.text_width(t)).collect();
            let lt_w = self.renderer.text_width(m.lt_symbol);
            let region = bar::hit_test(ev.x, &widths, lt_w, 80, m.screen.w, mon == self.world.sel_mon);
            if region == ClickRegion::TagBar {
                let mut x = 0;
                for (i, w) in widths.iter().enumerate() {
                    x += w;
                    if ev.x < x {
                        clicked_tag = 1 << i;
                        break;
                    }
                }
            }
            region
        } else if let Some(c) = self.world.client(ev.window) {
            let _ = c;
            ClickRegion::ClientWin
        } else {
            ClickRegion::RootWin
        };

        if click == ClickRegion::ClientWin {
            if let Some(c) = self.world.client(ev.window) {
                if self.world.monitors[mon].selected != Some(ev.window) {
                    let win = c.win;
                    let (_, focused) = self.world.focus(Some(win));
                    self.apply_focus(focused);
                }
            }
            unsafe { xlib::XAllowEvents(self.conn.display, xlib::ReplayPointer, ev.time) };
        }

        let cleanmask = ev.state & !(xlib::LockMask | self.conn.numlock_mask);
        for b in config::BUTTONS.iter() {
            if b.click == click && b.button == ev.button && b.modifiers == cleanmask {
                // dwm's `buttonpress`: a tag-bar click overrides the
                // binding's static arg with the bitmask of the tag under
                // the pointer, so view/tag/toggleview/toggletag act on
                // the clicked tag rather than tag 0.
                let action = if click == ClickRegion::TagBar {
                    match b.action {
                        Action::View(_) => Action::View(clicked_tag),
                        Action::ToggleView(_) => Action::ToggleView(clicked_tag),
                        Action::Tag(_) => Action::Tag(clicked_tag),
                        Action::ToggleTag(_) => Action::ToggleTag(clicked_tag),
                        other => other,
                    }
                } else {
                    b.action
                };
                self.dispatch_action(action);
            }
        }
    }

    fn window_to_mon(&self, win: Window) -> usize {
        if win == self.conn.root {
            return self.world.sel_mon;
        }
        for (i, bar) in self.bars.iter().enumerate() {
            if bar.win == win {
                return i;
            }
        }
        if let Some(c) = self.world.client(win) {
            return c.mon;
        }
        self.world.sel_mon
    }

    fn on_motion_notify(&mut self, ev: &xlib::XMotionEvent) {
        if self.drag.is_some() {
            return; // pumped from inside movemouse/resizemouse's own loop
        }
        if ev.window != self.conn.root {
            return;
        }
        let mon = self.world.rect_to_mon(Rect::new(ev.x_root, ev.y_root, 1, 1));
        if mon != self.world.sel_mon {
            if let Some(sel) = self.world.monitors[self.world.sel_mon].selected {
                self.unfocus(sel, true);
            }
            self.world.sel_mon = mon;
            let (_, focused) = self.world.focus(None);
            self.apply_focus(focused);
        }
    }

    fn on_enter_notify(&mut self, ev: &xlib::XCrossingEvent) {
        if (ev.mode != xlib::NotifyNormal || ev.detail == xlib::NotifyInferior) && ev.window != self.conn.root {
            return;
        }
        let client_win = self.world.client(ev.window).map(|c| c.win);
        let mon = client_win
            .map(|w| self.world.clients[&w].mon)
            .unwrap_or_else(|| self.window_to_mon(ev.window));

        if mon != self.world.sel_mon {
            if let Some(sel) = self.world.monitors[self.world.sel_mon].selected {
                self.unfocus(sel, true);
            }
            self.world.sel_mon = mon;
        } else if client_win.is_none() || client_win == self.world.monitors[self.world.sel_mon].selected {
            return;
        }
        let (_, focused) = self.world.focus(client_win);
        self.apply_focus(focused);
    }

    fn on_focus_in(&mut self, ev: &xlib::XFocusChangeEvent) {
        if let Some(sel) = self.world.monitors[self.world.sel_mon].selected {
            if sel != ev.window {
                self.conn.set_input_focus(sel);
            }
        }
    }

    fn on_expose(&mut self, ev: &xlib::XExposeEvent) {
        if ev.count == 0 {
            let mon = self.window_to_mon(ev.window);
            self.draw_bar(mon);
        }
    }

    fn on_destroy_notify(&mut self, ev: &xlib::XDestroyWindowEvent) {
        if self.world.client(ev.window).is_some() {
            self.unmanage(ev.window, true);
        }
    }

    fn on_unmap_notify(&mut self, ev: &xlib::XUnmapEvent) {
        if self.world.client(ev.window).is_some() {
            if ev.send_event != 0 {
                self.conn.set_client_state(ev.window, 0); // WithdrawnState
            } else {
                self.unmanage(ev.window, false);
            }
        }
    }

    fn on_map_request(&mut self, ev: &xlib::XMapRequestEvent) {
        let Some(wa) = self.conn.window_attributes(ev.window) else { return };
        if wa.override_redirect != 0 {
            return;
        }
        if self.world.client(ev.window).is_none() {
            self.manage(ev.window, wa);
        }
    }

    fn on_configure_request(&mut self, ev: &xlib::XConfigureRequestEvent) {
        if let Some(c) = self.world.client(ev.window) {
            let win = c.win;
            let mon = c.mon;
            let floating = c.is_floating || self.world.monitors[mon].cur_layout().is_floating();
            if floating {
                let mut rect = self.world.clients[&win].rect();
                let mask = ev.value_mask as u32;
                if mask & xlib::CWX as u32 != 0 {
                    rect.x = ev.x;
                }
                if mask & xlib::CWY as u32 != 0 {
                    rect.y = ev.y;
                }
                if mask & xlib::CWWidth as u32 != 0 {
                    rect.w = ev.width;
                }
                if mask & xlib::CWHeight as u32 != 0 {
                    rect.h = ev.height;
                }
                self.world.commit_geometry(win, rect);
                let bw = self.world.clients[&win].border_width;
                self.conn.configure_window(win, rect, bw);
            } else {
                let rect = self.world.clients[&win].rect();
                let bw = self.world.clients[&win].border_width;
                self.conn.send_configure_notify(win, rect, bw);
            }
        } else {
            let mut changes = xlib::XWindowChanges {
                x: ev.x,
                y: ev.y,
                width: ev.width,
                height: ev.height,
                border_width: ev.border_width,
                sibling: ev.above,
                stack_mode: ev.detail,
            };
            unsafe {
                xlib::XConfigureWindow(self.conn.display, ev.window, ev.value_mask as u32, &mut changes);
            }
        }
        self.conn.sync();
    }

    fn on_configure_notify(&mut self, ev: &xlib::XConfigureEvent) {
        if ev.window != self.conn.root {
            return;
        }
        let screens = self.conn.screens();
        if self.world.update_geom(screens) {
            self.arrange_all();
        }
    }

    fn on_property_notify(&mut self, ev: &xlib::XPropertyEvent) {
        if ev.window == self.conn.root && ev.atom == xlib::XA_WM_NAME {
            self.update_status();
            return;
        }
        if ev.state == xlib::PropertyDelete {
            return;
        }
        let Some(win) = self.world.client(ev.window).map(|c| c.win) else { return };
        if ev.atom == xlib::XA_WM_NORMAL_HINTS {
            let hints = self.conn.size_hints(win);
            if let Some(c) = self.world.clients.get_mut(&win) {
                c.hints = hints;
                c.is_fixed = hints.is_fixed();
            }
        } else if ev.atom == xlib::XA_WM_HINTS {
            self.apply_wm_hints(win);
            self.draw_bars();
        } else if ev.atom == xlib::XA_WM_TRANSIENT_FOR {
            let is_floating = self.world.clients[&win].is_floating;
            if !is_floating && self.conn.transient_for(win).is_some() {
                if let Some(c) = self.world.clients.get_mut(&win) {
                    c.is_floating = true;
                }
                let mon = self.world.clients[&win].mon;
                self.arrange(mon);
            }
        }
        if ev.atom == xlib::XA_WM_NAME || ev.atom == self.conn.net.wm_name {
            if let Some(name) = self.conn.text_property(win, self.conn.net.wm_name) {
                if let Some(c) = self.world.clients.get_mut(&win) {
                    c.name = name;
                }
            }
            let mon = self.world.clients[&win].mon;
            if self.world.monitors[mon].selected == Some(win) {
                self.draw_bar(mon);
            }
        }
        if ev.atom == self.conn.net.wm_window_type {
            self.apply_window_type(win);
        }
    }

    fn on_client_message(&mut self, ev: &xlib::XClientMessageEvent) {
        if ev.message_type == self.conn.net.wm_state {
            let data0 = unsafe { ev.data.get_long(0) };
            let data1 = unsafe { ev.data.get_long(1) } as u64;
            let data2 = unsafe { ev.data.get_long(2) } as u64;
            let fullscreen_atom = self.conn.net.wm_state_fullscreen;
            if data1 == fullscreen_atom || data2 == fullscreen_atom {
                if let Some(c) = self.world.client(ev.window) {
                    let win = c.win;
                    let currently = self.world.clients[&win].is_fullscreen;
                    // 0 remove, 1 add, 2 toggle
                    let target = match data0 {
                        0 => false,
                        1 => true,
                        _ => !currently,
                    };
                    self.set_fullscreen(win, target);
                }
            }
        } else if ev.message_type == self.conn.net.active_window {
            if let Some(c) = self.world.client(ev.window) {
                let win = c.win;
                if self.world.monitors[self.world.clients[&win].mon].selected != Some(win) {
                    let _ = self.world.clients[&win].is_urgent; // urgency set by caller via wmhints path
                    if let Some(cm) = self.world.clients.get_mut(&win) {
                        cm.is_urgent = true;
                    }
                    self.draw_bars();
                }
            }
        }
    }

    fn on_mapping_notify(&mut self, ev: &mut xlib::XMappingEvent) {
        unsafe { xlib::XRefreshKeyboardMapping(ev) };
        if ev.request == xlib::MappingKeyboard {
            self.grab_keys();
        }
    }

    fn set_fullscreen(&mut self, win: Window, fullscreen: bool) {
        let Some(c) = self.world.clients.get(&win) else { return };
        if fullscreen && !c.is_fullscreen {
            let mon = c.mon;
            let screen = self.world.monitors[mon].screen;
            if let Some(cm) = self.world.clients.get_mut(&win) {
                cm.is_fullscreen = true;
                cm.old_state = cm.is_floating;
                cm.old_border_width = cm.border_width;
                cm.border_width = 0;
                cm.is_floating = true;
            }
            unsafe {
                xlib::XChangeProperty(
                    self.conn.display,
                    win,
                    self.conn.net.wm_state,
                    xlib::XA_ATOM,
                    32,
                    xlib::PropModeReplace,
                    &self.conn.net.wm_state_fullscreen as *const u64 as *const u8,
                    1,
                );
            }
            self.world.commit_geometry(win, screen);
            self.conn.configure_window(win, screen, 0);
            self.conn.raise_window(win);
        } else if !fullscreen && c.is_fullscreen {
            let restore = Rect::new(c.old_x, c.old_y, c.old_w, c.old_h);
            let old_bw = c.old_border_width;
            let old_state = c.old_state;
            let mon = c.mon;
            if let Some(cm) = self.world.clients.get_mut(&win) {
                cm.is_fullscreen = false;
                cm.is_floating = old_state;
                cm.border_width = old_bw;
            }
            unsafe {
                xlib::XChangeProperty(
                    self.conn.display,
                    win,
                    self.conn.net.wm_state,
                    xlib::XA_ATOM,
                    32,
                    xlib::PropModeReplace,
                    std::ptr::null(),
                    0,
                );
            }
            self.world.commit_geometry(win, restore);
            self.conn.configure_window(win, restore, old_bw);
            self.arrange(mon);
        }
    }

    // ---- user actions -------------------------------------------------------

    fn dispatch_action(&mut self, action: Action) {
        match action {
            Action::View(tags) => self.view(tags),
            Action::ToggleView(tags) => self.toggle_view(tags),
            Action::Tag(tags) => self.tag(tags),
            Action::ToggleTag(tags) => self.toggle_tag(tags),
            Action::FocusStack(dir) => self.focus_stack(dir),
            Action::FocusMon(idx) => self.focus_mon(idx),
            Action::TagMon(idx) => self.tag_mon(idx),
            Action::Zoom => self.zoom(),
            Action::KillClient => self.kill_client(),
            Action::SetLayout(kind) => self.set_layout(kind),
            Action::SetMFact(delta) => self.set_mfact(delta),
            Action::ToggleFloating => self.toggle_floating(),
            Action::ToggleBar => self.toggle_bar(),
            Action::MoveMouse => self.begin_drag(DragKind::Move),
            Action::ResizeMouse => self.begin_drag(DragKind::Resize),
            Action::Spawn(argv) => spawn::spawn(argv),
            Action::Quit => self.running = false,
        }
    }

    fn view(&mut self, tags: u32) {
        let mon = self.world.sel_mon;
        let m = &mut self.world.monitors[mon];
        if tags == m.tagset[m.sel_tags] {
            return;
        }
        m.sel_tags ^= 1;
        if tags != 0 {
            m.tagset[m.sel_tags] = tags;
        } else {
            m.tagset[m.sel_tags] = m.tagset[1 - m.sel_tags];
        }
        self.arrange(mon);
    }

    fn toggle_view(&mut self, tags: u32) {
        let mon = self.world.sel_mon;
        let m = &mut self.world.monitors[mon];
        let new = m.tagset[m.sel_tags] ^ tags;
        if new == 0 {
            return;
        }
        m.tagset[m.sel_tags] = new;
        self.arrange(mon);
    }

    fn tag(&mut self, tags: u32) {
        let mon = self.world.sel_mon;
        let Some(sel) = self.world.monitors[mon].selected else { return };
        if tags & config::tag_mask() == 0 {
            return;
        }
        if let Some(c) = self.world.clients.get_mut(&sel) {
            c.tags = tags & config::tag_mask();
        }
        let (_, focused) = self.world.focus(None);
        self.apply_focus(focused);
        self.arrange(mon);
    }

    fn toggle_tag(&mut self, tags: u32) {
        let mon = self.world.sel_mon;
        let Some(sel) = self.world.monitors[mon].selected else { return };
        let current = self.world.clients[&sel].tags;
        let new = current ^ (tags & config::tag_mask());
        if new == 0 {
            return;
        }
        if let Some(c) = self.world.clients.get_mut(&sel) {
            c.tags = new;
        }
        let (_, focused) = self.world.focus(None);
        self.apply_focus(focused);
        self.arrange(mon);
    }

    fn focus_stack(&mut self, dir: StackDirection) {
        let mon = self.world.sel_mon;
        let order = &self.world.monitors[mon].order;
        let tagset = self.world.monitors[mon].cur_tagset();
        let visible: Vec<Window> = order
            .iter()
            .copied()
            .filter(|w| self.world.clients[w].is_visible(tagset))
            .collect();
        if visible.is_empty() {
            return;
        }
        let Some(sel) = self.world.monitors[mon].selected else {
            let (_, focused) = self.world.focus(Some(visible[0]));
            self.apply_focus(focused);
            return;
        };
        let Some(pos) = visible.iter().position(|w| *w == sel) else { return };
        let next = match dir {
            StackDirection::Next => visible[(pos + 1) % visible.len()],
            StackDirection::Prev => visible[(pos + visible.len() - 1) % visible.len()],
        };
        let (_, focused) = self.world.focus(Some(next));
        self.apply_focus(focused);
        self.restack(mon);
    }

    fn focus_mon(&mut self, idx: i32) {
        if self.world.monitors.len() <= 1 {
            return;
        }
        let target = (idx as usize).min(self.world.monitors.len() - 1);
        if target == self.world.sel_mon {
            return;
        }
        if let Some(sel) = self.world.monitors[self.world.sel_mon].selected {
            self.unfocus(sel, true);
        }
        self.world.sel_mon = target;
        let (_, focused) = self.world.focus(None);
        self.apply_focus(focused);
    }

    fn tag_mon(&mut self, idx: i32) {
        let mon = self.world.sel_mon;
        let Some(sel) = self.world.monitors[mon].selected else { return };
        if self.world.monitors.len() <= 1 {
            return;
        }
        let target = (idx as usize).min(self.world.monitors.len() - 1);
        self.world.send_mon(sel, target);
        let (_, focused) = self.world.focus(None);
        self.apply_focus(focused);
        self.arrange_all();
    }

    fn zoom(&mut self) {
        if self.world.zoom() {
            let mon = self.world.sel_mon;
            self.arrange(mon);
        }
    }

    fn kill_client(&mut self) {
        let mon = self.world.sel_mon;
        let Some(sel) = self.world.monitors[mon].selected else { return };
        if !self.conn.send_protocol(sel, self.conn.wm.delete_window) {
            self.conn.kill_client(sel);
        }
    }

    fn set_layout(&mut self, kind: Option<LayoutKind>) {
        let mon = self.world.sel_mon;
        let m = &mut self.world.monitors[mon];
        if kind.is_none() || Some(m.lt[m.sel_lt]) != kind {
            m.sel_lt ^= 1;
        }
        if let Some(k) = kind {
            m.lt[m.sel_lt] = k;
        }
        m.lt_symbol = m.lt[m.sel_lt].symbol();
        if self.world.monitors[mon].selected.is_some() {
            self.arrange(mon);
        } else {
            self.draw_bar(mon);
        }
    }

    fn set_mfact(&mut self, delta: f32) {
        let mon = self.world.sel_mon;
        if self.world.monitors[mon].cur_layout().is_floating() {
            return;
        }
        let f = if delta < 1.0 {
            delta + self.world.monitors[mon].mfact
        } else {
            delta - 1.0
        };
        if !(0.1..=0.9).contains(&f) {
            return;
        }
        self.world.monitors[mon].mfact = f;
        self.arrange(mon);
    }

    fn toggle_floating(&mut self) {
        let mon = self.world.sel_mon;
        let Some(sel) = self.world.monitors[mon].selected else { return };
        let c = &self.world.clients[&sel];
        if c.is_fullscreen {
            return;
        }
        let was_floating = c.is_floating;
        let (x, y, w, h) = (c.old_x, c.old_y, c.old_w, c.old_h);
        if let Some(cm) = self.world.clients.get_mut(&sel) {
            cm.is_floating = !was_floating;
        }
        if !was_floating {
            self.apply_resize(sel, Rect::new(x, y, w.max(1), h.max(1)), false);
        }
        self.arrange(mon);
    }

    fn toggle_bar(&mut self) {
        let mon = self.world.sel_mon;
        let m = &mut self.world.monitors[mon];
        m.show_bar = !m.show_bar;
        let bar_height = self.renderer.bar_height();
        m.window_area.y = if m.show_bar {
            if m.top_bar { m.screen.y + bar_height } else { m.screen.y }
        } else {
            m.screen.y
        };
        m.window_area.h = if m.show_bar { m.screen.h - bar_height } else { m.screen.h };
        let bar_win = self.bars[mon].win;
        let bar_y = if m.show_bar { m.bar_y } else { -bar_height };
        unsafe {
            xlib::XMoveWindow(self.conn.display, bar_win, m.screen.x, bar_y);
        }
        self.arrange(mon);
    }

    /// Mouse-driven move/resize. dwm pumps its own nested event loop here;
    /// this records drag state and the caller's `run` loop routes
    /// `MotionNotify` back through `continue_drag` until `ButtonRelease`.
    fn begin_drag(&mut self, kind: DragKind) {
        let mon = self.world.sel_mon;
        let Some(win) = self.world.monitors[mon].selected else { return };
        let c = &self.world.clients[&win];
        if c.is_fullscreen {
            return;
        }
        self.restack(mon);
        let cursor = match kind {
            DragKind::Move => self.conn.cursor_move,
            DragKind::Resize => self.conn.cursor_resize,
        };
        let grabbed = unsafe {
            xlib::XGrabPointer(
                self.conn.display,
                self.conn.root,
                xlib::False,
                crate::xconn::MOUSE_MASK as u32,
                xlib::GrabModeAsync,
                xlib::GrabModeAsync,
                0,
                cursor,
                xlib::CurrentTime,
            )
        };
        if grabbed != xlib::GrabSuccess {
            return;
        }
        let orig = c.rect();
        let bw = c.border_width;
        let (root_x, root_y) = match kind {
            DragKind::Move => self.pointer_root(),
            // `resizemouse` warps the pointer to the window's bottom-right
            // corner before entering the grab loop, then drives resize off
            // the pointer's motion from there.
            DragKind::Resize => {
                self.conn.warp_pointer(win, orig.w + bw - 1, orig.h + bw - 1);
                (orig.x + orig.w + bw - 1, orig.y + orig.h + bw - 1)
            }
        };
        self.drag = Some(DragState {
            win,
            kind,
            start_root_x: root_x,
            start_root_y: root_y,
            orig,
            last_motion: 0,
        });
        self.pump_drag();
    }

    fn pointer_root(&self) -> (i32, i32) {
        unsafe {
            let (mut root_ret, mut child_ret) = (0u64, 0u64);
            let (mut rx, mut ry, mut wx, mut wy) = (0, 0, 0, 0);
            let mut mask = 0u32;
            xlib::XQueryPointer(
                self.conn.display,
                self.conn.root,
                &mut root_ret,
                &mut child_ret,
                &mut rx,
                &mut ry,
                &mut wx,
                &mut wy,
                &mut mask,
            );
            (rx, ry)
        }
    }

    /// Runs the nested event pump dwm's `movemouse`/`resizemouse` loop
    /// performs: other handlers still fire (`ConfigureRequest`, `Expose`,
    /// `MapRequest`), `MotionNotify` is throttled to 60Hz and drives the
    /// drag; the loop ends at `ButtonRelease`.
    fn pump_drag(&mut self) {
        let start = Instant::now();
        loop {
            let mut ev: XEvent = unsafe { std::mem::zeroed() };
            unsafe {
                xlib::XMaskEvent(
                    self.conn.display,
                    (crate::xconn::MOUSE_MASK | xlib::ExposureMask | xlib::SubstructureRedirectMask) as i64,
                    &mut ev,
                )
            };
            let kind = unsafe { ev.get_type() };
            match kind {
                xlib::ConfigureRequest => self.on_configure_request(unsafe { &ev.configure_request }),
                xlib::Expose => self.on_expose(unsafe { &ev.expose }),
                xlib::MapRequest => self.on_map_request(unsafe { &ev.map_request }),
                xlib::MotionNotify => {
                    let motion = unsafe { &ev.motion };
                    if (motion.time as i64 - self.drag.as_ref().unwrap().last_motion) <= 1000 / 60 {
                        continue;
                    }
                    if let Some(d) = &mut self.drag {
                        d.last_motion = motion.time as i64;
                    }
                    self.continue_drag(motion.x_root, motion.y_root);
                }
                xlib::ButtonRelease => break,
                _ => {}
            }
            if start.elapsed().as_secs() > 600 {
                break; // runaway-grab backstop; never hit in practice
            }
        }
        self.end_drag();
    }

    fn continue_drag(&mut self, root_x: i32, root_y: i32) {
        let Some(drag) = self.drag.as_ref() else { return };
        let win = drag.win;
        let start_root_x = drag.start_root_x;
        let start_root_y = drag.start_root_y;
        let orig = drag.orig;
        let is_move = matches!(drag.kind, DragKind::Move);

        let Some(c) = self.world.clients.get(&win) else { return };
        let mon = c.mon;
        let (cx, cy, cw, ch, bw, is_floating) = (c.x, c.y, c.w, c.h, c.border_width, c.is_floating);
        let floating_layout = self.world.monitors[mon].cur_layout().is_floating();

        if is_move {
            let nx = orig.x + (root_x - start_root_x);
            let ny = orig.y + (root_y - start_root_y);
            let (nx, ny) = self.snap_to_edges(mon, nx, ny, cw, ch, bw);
            if !is_floating && !floating_layout {
                let dx = (nx - cx).abs();
                let dy = (ny - cy).abs();
                if dx > self.settings.snap || dy > self.settings.snap {
                    self.toggle_floating();
                }
            }
            if floating_layout || self.world.clients[&win].is_floating {
                self.apply_resize(win, Rect::new(nx, ny, cw, ch), true);
            }
        } else {
            let nw = (root_x - orig.x - 2 * bw + 1).max(1);
            let nh = (root_y - orig.y - 2 * bw + 1).max(1);
            if !is_floating && !floating_layout {
                let dw = (nw - cw).abs();
                let dh = (nh - ch).abs();
                if dw > self.settings.snap || dh > self.settings.snap {
                    self.toggle_floating();
                }
            }
            if floating_layout || self.world.clients[&win].is_floating {
                self.apply_resize(win, Rect::new(cx, cy, nw, nh), true);
            }
        }
    }

    fn snap_to_edges(&self, mon: usize, x: i32, y: i32, w: i32, h: i32, bw: i32) -> (i32, i32) {
        let snap = self.settings.snap;
        let area = self.world.monitors[mon].window_area;
        let mut x = x;
        let mut y = y;
        if (x - area.x).abs() < snap {
            x = area.x;
        } else if ((area.x + area.w) - (x + w + 2 * bw)).abs() < snap {
            x = area.x + area.w - w - 2 * bw;
        }
        if (y - area.y).abs() < snap {
            y = area.y;
        } else if ((area.y + area.h) - (y + h + 2 * bw)).abs() < snap {
            y = area.y + area.h - h - 2 * bw;
        }
        (x, y)
    }

    fn end_drag(&mut self) {
        let Some(drag) = self.drag.take() else { return };
        let Some(c) = self.world.clients.get(&drag.win) else {
            unsafe { xlib::XUngrabPointer(self.conn.display, xlib::CurrentTime) };
            return;
        };
        if matches!(drag.kind, DragKind::Resize) {
            self.conn
                .warp_pointer(drag.win, c.w + c.border_width - 1, c.h + c.border_width - 1);
        }
        unsafe {
            xlib::XUngrabPointer(self.conn.display, xlib::CurrentTime);
        }
        let Some(c) = self.world.clients.get(&drag.win) else { return };
        let rect = c.rect();
        let mon = self.world.rect_to_mon(rect);
        if mon != self.world.sel_mon {
            self.world.send_mon(drag.win, mon);
            self.world.sel_mon = mon;
            let (_, focused) = self.world.focus(None);
            self.apply_focus(focused);
        }
    }
}
