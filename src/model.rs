//! Window/monitor state model (C3).
//!
//! Clients live in a `HashMap<Window, Client>` keyed directly by their X11
//! XID, with per-monitor arrangement order and focus-recency kept as
//! `Vec<Window>` lists (§9 favours an arena/indices model over dwm's
//! intrusive linked lists for a memory-safe target; the XID already is a
//! stable, copyable handle, so no separate generational index is needed).

use std::collections::HashMap;

use x11::xlib::Window;

use crate::config::tag_mask;
use crate::geometry::{Rect, SizeHints};
use crate::layout::{arrange_rects, LayoutKind, ALL_LAYOUTS};

/// A managed top-level window (§3 Data Model, `Client`).
#[derive(Debug, Clone)]
pub struct Client {
    pub win: Window,
    pub name: String,
    pub class: String,
    pub instance: String,

    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub old_x: i32,
    pub old_y: i32,
    pub old_w: i32,
    pub old_h: i32,
    pub border_width: i32,
    pub old_border_width: i32,

    pub hints: SizeHints,
    pub tags: u32,

    pub is_fixed: bool,
    pub is_floating: bool,
    pub is_urgent: bool,
    pub never_focus: bool,
    pub old_state: bool,
    pub is_fullscreen: bool,

    pub mon: usize,
}

impl Client {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.w, self.h)
    }

    pub fn is_visible(&self, tagset: u32) -> bool {
        self.tags & tagset != 0
    }
}

/// Per-monitor workspace state (§3, `Monitor`).
#[derive(Debug, Clone)]
pub struct Monitor {
    pub num: i32,
    pub mfact: f32,
    pub nmaster: u32,
    pub screen: Rect,
    pub window_area: Rect,
    pub bar_y: i32,
    pub show_bar: bool,
    pub top_bar: bool,
    pub lt_symbol: &'static str,
    pub sel_lt: usize,
    pub lt: [LayoutKind; 2],
    pub tagset: [u32; 2],
    pub sel_tags: usize,

    /// Arrangement order, front-to-back as `attach` leaves it (most
    /// recently attached client first, matching dwm's head-insert `attach`).
    pub order: Vec<Window>,
    /// Focus-recency stack, most-recently-focused first.
    pub stack: Vec<Window>,
    pub selected: Option<Window>,
}

impl Monitor {
    pub fn new(num: i32, screen: Rect) -> Self {
        Monitor {
            num,
            mfact: 0.55,
            nmaster: 1,
            screen,
            window_area: screen,
            bar_y: screen.y,
            show_bar: true,
            top_bar: true,
            lt_symbol: ALL_LAYOUTS[0].symbol(),
            sel_lt: 0,
            lt: [ALL_LAYOUTS[0], ALL_LAYOUTS[1]],
            tagset: [1, 1],
            sel_tags: 0,
            order: Vec::new(),
            stack: Vec::new(),
            selected: None,
        }
    }

    pub fn cur_tagset(&self) -> u32 {
        self.tagset[self.sel_tags]
    }

    pub fn cur_layout(&self) -> LayoutKind {
        self.lt[self.sel_lt]
    }
}

/// The complete state of the running manager (§3, `World`).
pub struct World {
    pub clients: HashMap<Window, Client>,
    pub monitors: Vec<Monitor>,
    pub sel_mon: usize,
}

impl World {
    pub fn new(screens: Vec<Rect>) -> Self {
        let monitors = screens
            .into_iter()
            .enumerate()
            .map(|(i, r)| Monitor::new(i as i32, r))
            .collect();
        World {
            clients: HashMap::new(),
            monitors,
            sel_mon: 0,
        }
    }

    pub fn sel_monitor(&self) -> &Monitor {
        &self.monitors[self.sel_mon]
    }

    pub fn sel_monitor_mut(&mut self) -> &mut Monitor {
        &mut self.monitors[self.sel_mon]
    }

    pub fn client(&self, win: Window) -> Option<&Client> {
        self.clients.get(&win)
    }

    pub fn client_mut(&mut self, win: Window) -> Option<&mut Client> {
        self.clients.get_mut(&win)
    }

    /// Clients tiled under the current layout on `mon`, in arrangement
    /// order — `nexttiled` generalised to a full pass rather than a
    /// successor-skip, since the order list is a `Vec` and not a linked list.
    pub fn tiled(&self, mon: usize) -> Vec<Window> {
        let m = &self.monitors[mon];
        let tagset = m.cur_tagset();
        m.order
            .iter()
            .copied()
            .filter(|w| {
                let c = &self.clients[w];
                !c.is_floating && c.is_visible(tagset)
            })
            .collect()
    }

    /// Head-inserts into arrangement order, mirroring dwm's `attach`
    /// (`client->next = mon->clients; mon->clients = client`).
    pub fn attach(&mut self, mon: usize, win: Window) {
        self.monitors[mon].order.insert(0, win);
    }

    pub fn detach(&mut self, win: Window) {
        if let Some(c) = self.clients.get(&win) {
            let mon = c.mon;
            self.monitors[mon].order.retain(|w| *w != win);
        }
    }

    /// Head-inserts into the focus stack, mirroring `attachstack`.
    pub fn attach_stack(&mut self, mon: usize, win: Window) {
        self.monitors[mon].stack.insert(0, win);
    }

    /// Removes from the focus stack; if the removed window was selected,
    /// promotes the next visible entry, mirroring `detachstack`.
    pub fn detach_stack(&mut self, win: Window) {
        let mon = match self.clients.get(&win) {
            Some(c) => c.mon,
            None => return,
        };
        let m = &mut self.monitors[mon];
        m.stack.retain(|w| *w != win);
        if m.selected == Some(win) {
            let tagset = m.cur_tagset();
            m.selected = m
                .stack
                .iter()
                .copied()
                .find(|w| self.clients[w].is_visible(tagset));
        }
    }

    /// Moves focus to `win` (or, if `None`/invisible, to the first visible
    /// entry of the selected monitor's stack), mirroring `focus`. Border
    /// colour / `XSetInputFocus` are the caller's job (xconn); this only
    /// updates model state and returns the client that should be
    /// unfocused and the one that should be focused, if they changed.
    pub fn focus(&mut self, win: Option<Window>) -> (Option<Window>, Option<Window>) {
        let sel_mon = self.sel_mon;
        let tagset = self.monitors[sel_mon].cur_tagset();

        let target = match win.filter(|w| self.clients[w].is_visible(tagset)) {
            Some(w) => Some(w),
            None => self.monitors[sel_mon]
                .stack
                .iter()
                .copied()
                .find(|w| self.clients[w].is_visible(tagset)),
        };

        let prev = self.monitors[sel_mon].selected;
        let unfocused = if prev.is_some() && prev != target { prev } else { None };

        if let Some(w) = target {
            let mon = self.clients[&w].mon;
            self.sel_mon = mon;
            if let Some(c) = self.clients.get_mut(&w) {
                c.is_urgent = false;
            }
            self.detach_stack(w);
            self.attach_stack(mon, w);
            self.monitors[mon].selected = Some(w);
        } else {
            self.monitors[sel_mon].selected = None;
        }

        (unfocused, target)
    }

    /// `zoom`: promotes the selected client to master. Zooming the current
    /// master promotes the next tiled client instead of doing nothing
    /// (§0.1 "zoom"); a no-op on a floating layout or a floating client.
    pub fn zoom(&mut self) -> bool {
        let mon = self.sel_mon;
        if self.monitors[mon].cur_layout().is_floating() {
            return false;
        }
        let Some(mut target) = self.monitors[mon].selected else {
            return false;
        };
        if self.clients[&target].is_floating {
            return false;
        }

        let tiled = self.tiled(mon);
        if tiled.first() == Some(&target) {
            let Some(&next) = tiled.get(1) else {
                return false;
            };
            target = next;
        }

        self.detach(target);
        self.attach(mon, target);
        self.monitors[mon].selected = Some(target);
        self.monitors[mon].stack.retain(|w| *w != target);
        self.monitors[mon].stack.insert(0, target);
        true
    }

    /// Moves `win` to `mon`, reassigning it to the target monitor's current
    /// tag view, mirroring `sendmon`.
    pub fn send_mon(&mut self, win: Window, mon: usize) {
        let old_mon = match self.clients.get(&win) {
            Some(c) if c.mon != mon => c.mon,
            _ => return,
        };
        let _ = old_mon;
        self.detach(win);
        self.detach_stack(win);
        let tags = self.monitors[mon].cur_tagset();
        if let Some(c) = self.clients.get_mut(&win) {
            c.mon = mon;
            c.tags = tags;
        }
        self.attach(mon, win);
        self.attach_stack(mon, win);
    }

    /// Arranges all tiled, visible clients of `mon` and returns the
    /// `(window, rect)` pairs the caller should push to X via `resize`.
    /// Gap/border stripping (dwm's `resizeclient`) is applied here, using
    /// each client's *own* monitor rather than the globally selected one —
    /// dwm.c's `resizeclient` reads `selected_monitor->clients` to compute
    /// `n` unconditionally, which silently misbehaves when resizing a
    /// client on an unfocused monitor; this is corrected rather than
    /// reproduced (recorded as an Open Question resolution).
    pub fn arrange(&mut self, mon: usize, border_px: i32, gap: i32) -> Vec<(Window, Rect)> {
        let tiled = self.tiled(mon);
        let kind = self.monitors[mon].cur_layout();
        self.monitors[mon].lt_symbol = kind.symbol();

        let area = self.monitors[mon].window_area;
        let rects = arrange_rects(
            kind,
            area,
            tiled.len(),
            self.monitors[mon].nmaster,
            self.monitors[mon].mfact,
            border_px,
        );

        let single_or_monocle = tiled.len() == 1 || kind == LayoutKind::Monocle;

        let max_right = rects.iter().map(|r| r.x + r.w).max().unwrap_or(0);
        let max_bottom = rects.iter().map(|r| r.y + r.h).max().unwrap_or(0);

        tiled
            .into_iter()
            .zip(rects)
            .map(|(win, r)| {
                let bw = if single_or_monocle { 0 } else { border_px };
                let rect = if single_or_monocle {
                    // arrange_rects already stripped 2*border_px from each
                    // dimension; the client's own border is zeroed below,
                    // so add that back to fill the monocle/single-client
                    // area exactly (§4.2).
                    Rect::new(r.x, r.y, r.w + 2 * border_px, r.h + 2 * border_px)
                } else {
                    // §4.2: inset by window_gap, shrinking width/height by
                    // 2*gap. A tile that isn't the last in its row/column
                    // only loses the single gap bordering it; the gap
                    // facing the next tile comes out of that tile's
                    // leading edge instead, so adjacent tiles end up gap
                    // apart rather than double-gap apart (S1: master
                    // column 952, stack column 946).
                    let w_shrink = if r.x + r.w == max_right { 2 * gap } else { gap };
                    let h_shrink = if r.y + r.h == max_bottom { 2 * gap } else { gap };
                    Rect::new(r.x + gap, r.y + gap, r.w - w_shrink, r.h - h_shrink)
                };
                if let Some(c) = self.clients.get_mut(&win) {
                    c.border_width = bw;
                }
                (win, rect)
            })
            .collect()
    }

    /// Records the client's previous geometry and applies the new one to
    /// model state; the caller still owns the `XConfigureWindow` call.
    pub fn commit_geometry(&mut self, win: Window, rect: Rect) {
        if let Some(c) = self.clients.get_mut(&win) {
            c.old_x = c.x;
            c.old_y = c.y;
            c.old_w = c.w;
            c.old_h = c.h;
            c.x = rect.x;
            c.y = rect.y;
            c.w = rect.w;
            c.h = rect.h;
        }
    }

    /// Xinerama reconciliation (`updategeom`): given the current unique
    /// screen rectangles, grows or shrinks the monitor list and flags
    /// which existing monitors actually changed geometry. Clients on a
    /// removed monitor are reattached to monitor 0, mirroring dwm.c.
    /// Returns `true` if anything changed (the caller should re-`arrange`).
    pub fn update_geom(&mut self, screens: Vec<Rect>) -> bool {
        let mut dirty = false;

        while self.monitors.len() < screens.len() {
            let num = self.monitors.len() as i32;
            self.monitors.push(Monitor::new(num, screens[self.monitors.len()]));
            dirty = true;
        }

        for (i, screen) in screens.iter().enumerate() {
            let m = &mut self.monitors[i];
            if m.screen != *screen {
                dirty = true;
                m.num = i as i32;
                m.screen = *screen;
                m.window_area = *screen;
                m.bar_y = screen.y;
            }
        }

        while self.monitors.len() > screens.len() {
            let removed = self.monitors.pop().unwrap();
            dirty = true;
            for win in removed.order {
                if let Some(c) = self.clients.get_mut(&win) {
                    c.mon = 0;
                }
                self.attach(0, win);
            }
            if self.sel_mon >= self.monitors.len() {
                self.sel_mon = 0;
            }
        }

        dirty
    }

    /// Monitor whose intersection area with `rect` is largest, defaulting
    /// to the selected monitor when none intersect (§0.1 "recttomon").
    pub fn rect_to_mon(&self, rect: Rect) -> usize {
        let mut best = self.sel_mon;
        let mut best_area = 0i64;
        for (i, m) in self.monitors.iter().enumerate() {
            let a = rect.intersect_area(&m.window_area);
            if a > best_area {
                best_area = a;
                best = i;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_client(win: Window, mon: usize, tags: u32) -> Client {
        Client {
            win,
            name: String::new(),
            class: String::new(),
            instance: String::new(),
            x: 0,
            y: 0,
            w: 100,
            h: 100,
            old_x: 0,
            old_y: 0,
            old_w: 0,
            old_h: 0,
            border_width: 1,
            old_border_width: 1,
            hints: SizeHints::default(),
            tags,
            is_fixed: false,
            is_floating: false,
            is_urgent: false,
            never_focus: false,
            old_state: false,
            is_fullscreen: false,
            mon,
        }
    }

    fn one_monitor_world() -> World {
        World::new(vec![Rect::new(0, 0, 1200, 900)])
    }

    #[test]
    fn attach_inserts_at_head() {
        let mut w = one_monitor_world();
        w.clients.insert(1, mk_client(1, 0, 1));
        w.clients.insert(2, mk_client(2, 0, 1));
        w.attach(0, 1);
        w.attach(0, 2);
        assert_eq!(w.monitors[0].order, vec![2, 1]);
    }

    #[test]
    fn detach_stack_promotes_next_visible() {
        let mut w = one_monitor_world();
        w.clients.insert(1, mk_client(1, 0, 1));
        w.clients.insert(2, mk_client(2, 0, 1));
        w.attach_stack(0, 1);
        w.attach_stack(0, 2);
        w.monitors[0].selected = Some(2);
        w.detach_stack(2);
        assert_eq!(w.monitors[0].selected, Some(1));
    }

    #[test]
    fn zoom_promotes_next_when_master_already_selected() {
        let mut w = one_monitor_world();
        w.clients.insert(1, mk_client(1, 0, 1));
        w.clients.insert(2, mk_client(2, 0, 1));
        w.attach(0, 2);
        w.attach(0, 1); // order: [1, 2]
        w.monitors[0].selected = Some(1);
        w.monitors[0].stack = vec![1, 2];
        assert!(w.zoom());
        assert_eq!(w.monitors[0].order[0], 2);
    }

    #[test]
    fn zoom_noop_on_floating_layout() {
        let mut w = one_monitor_world();
        w.clients.insert(1, mk_client(1, 0, 1));
        w.attach(0, 1);
        w.monitors[0].selected = Some(1);
        w.monitors[0].lt[w.monitors[0].sel_lt] = LayoutKind::Floating;
        assert!(!w.zoom());
    }

    #[test]
    fn rect_to_mon_defaults_to_selected_when_no_intersection() {
        let mut w = World::new(vec![Rect::new(0, 0, 800, 600), Rect::new(800, 0, 800, 600)]);
        w.sel_mon = 1;
        let mon = w.rect_to_mon(Rect::new(5000, 5000, 10, 10));
        assert_eq!(mon, 1);
    }

    #[test]
    fn update_geom_grows_and_shrinks_monitor_list() {
        let mut w = World::new(vec![Rect::new(0, 0, 800, 600)]);
        assert!(w.update_geom(vec![Rect::new(0, 0, 800, 600), Rect::new(800, 0, 800, 600)]));
        assert_eq!(w.monitors.len(), 2);

        w.clients.insert(9, mk_client(9, 1, 1));
        w.attach(1, 9);
        assert!(w.update_geom(vec![Rect::new(0, 0, 800, 600)]));
        assert_eq!(w.monitors.len(), 1);
        assert_eq!(w.clients[&9].mon, 0);
        assert!(w.monitors[0].order.contains(&9));
    }

    #[test]
    fn tag_mask_matches_tag_count() {
        assert_eq!(tag_mask().count_ones(), 9);
    }

    // S1: one monitor 1920x1080, tile, mfact=0.5, nmaster=1, border=1,
    // gap=6, bar_height=14 (window_area starts at y=14). Two clients.
    #[test]
    fn s1_arrange_applies_border_and_gap() {
        let mut w = World::new(vec![Rect::new(0, 14, 1920, 1066)]);
        w.monitors[0].mfact = 0.5;
        w.monitors[0].nmaster = 1;
        // `attach` head-inserts, so attach B before A to leave A (the
        // first-mapped window) at the front of `order` as the master.
        w.clients.insert(2, mk_client(2, 0, 1));
        w.attach(0, 2);
        w.attach_stack(0, 2);
        w.clients.insert(1, mk_client(1, 0, 1));
        w.attach(0, 1);
        w.attach_stack(0, 1);

        let mut out = w.arrange(0, 1, 6);
        out.sort_by_key(|(win, _)| *win);
        assert_eq!(out, vec![
            (1, Rect::new(6, 20, 952, 1052)),
            (2, Rect::new(966, 20, 946, 1052)),
        ]);
        assert_eq!(w.clients[&1].border_width, 1);
        assert_eq!(w.clients[&2].border_width, 1);
    }

    // S3: set_layout(monocle) with three visible clients all fill the
    // borderless, gapless window area.
    #[test]
    fn s3_monocle_strips_border_and_gap() {
        let mut w = World::new(vec![Rect::new(0, 14, 1920, 1066)]);
        w.monitors[0].lt[w.monitors[0].sel_lt] = LayoutKind::Monocle;
        for win in [1, 2, 3] {
            w.clients.insert(win, mk_client(win, 0, 1));
            w.attach(0, win);
            w.attach_stack(0, win);
        }

        let out = w.arrange(0, 1, 6);
        assert_eq!(out.len(), 3);
        for (win, rect) in &out {
            assert_eq!(*rect, Rect::new(0, 14, 1920, 1066));
            assert_eq!(w.clients[win].border_width, 0);
        }
    }
}
