//! Windowing-server transport (the "W" external collaborator, §2): display
//! connection, atom/cursor management, property access and the handful of
//! `XConfigureWindow`/grab/focus primitives the event machine drives. Kept
//! as a thin façade over Xlib, the way the teacher's `Rdwm` wraps raw
//! `x11::xlib` calls in `unsafe` blocks one operation at a time.

use std::ffi::CString;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use libc::{c_int, c_long, c_uchar, c_ulong};
use x11::xinerama::{XineramaIsActive, XineramaQueryScreens, XineramaScreenInfo};
use x11::xlib::{self, *};

use crate::atoms::{NetAtoms, WmAtoms};
use crate::error::{Result, WmError};
use crate::geometry::{Rect, SizeHints};

/// Set by the startup error handler (`xerrorstart`) the instant a
/// `BadAccess` on the root window's `SubstructureRedirectMask` grab proves
/// another window manager already holds it (dwm.c's `wmdetected`).
static WM_DETECTED: AtomicBool = AtomicBool::new(false);

pub const ROOT_EVENT_MASK: c_long = SubstructureRedirectMask
    | SubstructureNotifyMask
    | ButtonPressMask
    | PointerMotionMask
    | EnterWindowMask
    | LeaveWindowMask
    | StructureNotifyMask
    | PropertyChangeMask;

pub const MOUSE_MASK: c_long = ButtonPressMask | ButtonReleaseMask | PointerMotionMask;

pub struct XConn {
    pub display: *mut Display,
    pub screen: c_int,
    pub root: Window,
    pub wm: WmAtoms,
    pub net: NetAtoms,
    pub numlock_mask: u32,
    pub cursor_normal: Cursor,
    pub cursor_move: Cursor,
    pub cursor_resize: Cursor,
}

unsafe extern "C" fn xerror_start(_display: *mut Display, _event: *mut XErrorEvent) -> c_int {
    WM_DETECTED.store(true, Ordering::SeqCst);
    0
}

/// Allow-list mirroring dwm's `xerror`: errors X itself would otherwise be
/// fatal for are tolerated for specific (request, error) pairs that occur
/// during normal operation (closing a window mid-configure, grabbing a
/// button on a window that just unmapped, etc.).
unsafe extern "C" fn xerror(_display: *mut Display, event: *mut XErrorEvent) -> c_int {
    let e = &*event;
    let request = e.request_code as i32;
    let code = e.error_code as i32;

    let tolerated = code == BadWindow
        || (request == x11::xlib::X_SetInputFocus && code == BadMatch)
        || (request == x11::xlib::X_PolyText8 && code == BadDrawable)
        || (request == x11::xlib::X_PolyFillRectangle && code == BadDrawable)
        || (request == x11::xlib::X_PolySegment && code == BadDrawable)
        || (request == x11::xlib::X_ConfigureWindow && code == BadMatch)
        || (request == x11::xlib::X_GrabButton && code == BadAccess)
        || (request == x11::xlib::X_GrabKey && code == BadAccess)
        || (request == x11::xlib::X_CopyArea && code == BadDrawable);

    if tolerated {
        return 0;
    }
    log::error!(
        "fatal X error: request {} error {}",
        e.request_code,
        e.error_code
    );
    0
}

impl XConn {
    pub fn open() -> Result<Self> {
        let display = unsafe { XOpenDisplay(ptr::null()) };
        if display.is_null() {
            return Err(WmError::DisplayConnect);
        }
        let screen = unsafe { XDefaultScreen(display) };
        if unsafe { XScreenOfDisplay(display, screen) }.is_null() {
            return Err(WmError::NoScreen);
        }
        let root = unsafe { XRootWindow(display, screen) };

        Self::check_other_wm(display, root)?;

        let wm = WmAtoms::intern(display);
        let net = NetAtoms::intern(display);

        let cursor_normal = unsafe { XCreateFontCursor(display, x11::cursorfont::XC_left_ptr) };
        let cursor_move = unsafe { XCreateFontCursor(display, x11::cursorfont::XC_fleur) };
        let cursor_resize =
            unsafe { XCreateFontCursor(display, x11::cursorfont::XC_sizing) };

        let mut conn = XConn {
            display,
            screen,
            root,
            wm,
            net,
            numlock_mask: 0,
            cursor_normal,
            cursor_move,
            cursor_resize,
        };
        conn.update_numlock_mask();
        Ok(conn)
    }

    /// Briefly grabs `SubstructureRedirectMask` under an error handler that
    /// only records whether a `BadAccess` fired, mirroring `checkotherwm`.
    fn check_other_wm(display: *mut Display, root: Window) -> Result<()> {
        WM_DETECTED.store(false, Ordering::SeqCst);
        unsafe {
            XSetErrorHandler(Some(xerror_start));
            XSelectInput(display, root, SubstructureRedirectMask);
            XSync(display, False);
            XSetErrorHandler(Some(xerror));
            XSync(display, False);
        }
        if WM_DETECTED.load(Ordering::SeqCst) {
            Err(WmError::CompetingWindowManager)
        } else {
            Ok(())
        }
    }

    pub fn select_root_input(&self) {
        unsafe {
            XSelectInput(self.display, self.root, ROOT_EVENT_MASK);
        }
    }

    pub fn set_supported(&self) {
        let list = self.net.supported_list();
        unsafe {
            XChangeProperty(
                self.display,
                self.root,
                self.net.supported,
                XA_ATOM,
                32,
                PropModeReplace,
                list.as_ptr() as *const c_uchar,
                list.len() as i32,
            );
        }
    }

    /// `updatenumlockmask`: discovers which modifier bit Num Lock maps to,
    /// so key/button grabs can be repeated for the 4 lock-state combinations
    /// (§0.1 "numlock handling").
    pub fn update_numlock_mask(&mut self) {
        self.numlock_mask = 0;
        unsafe {
            let modmap = XGetModifierMapping(self.display);
            if modmap.is_null() {
                return;
            }
            let m = &*modmap;
            for i in 0..8 {
                for j in 0..m.max_keypermod {
                    let keycode = *m
                        .modifiermap
                        .offset((i * m.max_keypermod + j) as isize);
                    if keycode == XKeysymToKeycode(self.display, x11::keysym::XK_Num_Lock as u64)
                    {
                        self.numlock_mask = 1 << i;
                    }
                }
            }
            XFreeModifiermap(modmap);
        }
    }

    /// All `(modifiers, keycode)` combinations a binding should be grabbed
    /// under, expanding for Lock/NumLock per §0.1.
    pub fn lock_combinations(&self, modifiers: u32) -> [u32; 4] {
        [
            modifiers,
            modifiers | LockMask,
            modifiers | self.numlock_mask,
            modifiers | self.numlock_mask | LockMask,
        ]
    }

    pub fn grab_key(&self, keysym: KeySym, modifiers: u32) {
        unsafe {
            let code = XKeysymToKeycode(self.display, keysym);
            if code == 0 {
                return;
            }
            for combo in self.lock_combinations(modifiers) {
                XGrabKey(
                    self.display,
                    code as i32,
                    combo,
                    self.root,
                    True,
                    GrabModeAsync,
                    GrabModeAsync,
                );
            }
        }
    }

    pub fn ungrab_all_keys(&self) {
        unsafe {
            XUngrabKey(self.display, AnyKey, AnyModifier, self.root);
        }
    }

    pub fn grab_button(&self, win: Window, button: u32, modifiers: u32, cursor_owner_events: bool) {
        unsafe {
            for combo in self.lock_combinations(modifiers) {
                XGrabButton(
                    self.display,
                    button,
                    combo,
                    win,
                    cursor_owner_events as i32,
                    (ButtonPressMask | ButtonReleaseMask) as u32,
                    GrabModeAsync,
                    GrabModeAsync,
                    0,
                    0,
                );
            }
        }
    }

    pub fn ungrab_all_buttons(&self, win: Window) {
        unsafe {
            XUngrabButton(self.display, AnyButton as u32, AnyModifier, win);
        }
    }

    pub fn configure_window(&self, win: Window, rect: Rect, border_width: i32) {
        unsafe {
            let mut changes = XWindowChanges {
                x: rect.x,
                y: rect.y,
                width: rect.w,
                height: rect.h,
                border_width,
                sibling: 0,
                stack_mode: 0,
            };
            XConfigureWindow(
                self.display,
                win,
                (CWX | CWY | CWWidth | CWHeight | CWBorderWidth) as u32,
                &mut changes,
            );
        }
    }

    /// Synthesises a `ConfigureNotify` with the client's current geometry,
    /// mirroring dwm's `configure`, for clients that don't actually need a
    /// geometry change but still expect a notification (e.g. border-only).
    pub fn send_configure_notify(&self, win: Window, rect: Rect, border_width: i32) {
        unsafe {
            let mut ev: XConfigureEvent = std::mem::zeroed();
            ev.type_ = ConfigureNotify;
            ev.display = self.display;
            ev.event = win;
            ev.window = win;
            ev.x = rect.x;
            ev.y = rect.y;
            ev.width = rect.w;
            ev.height = rect.h;
            ev.border_width = border_width;
            ev.above = 0;
            ev.override_redirect = 0;
            let mut xev = XEvent { configure: ev };
            XSendEvent(self.display, win, False, StructureNotifyMask, &mut xev);
        }
    }

    pub fn set_border_colour(&self, win: Window, pixel: c_ulong) {
        unsafe {
            XSetWindowBorder(self.display, win, pixel);
        }
    }

    pub fn alloc_colour(&self, hex: &str) -> c_ulong {
        unsafe {
            let cmap = XDefaultColormap(self.display, self.screen);
            let mut colour: XColor = std::mem::zeroed();
            let cstr = CString::new(hex).unwrap();
            if XAllocNamedColor(self.display, cmap, cstr.as_ptr(), &mut colour, &mut colour) == 0 {
                log::warn!("could not allocate colour {hex}");
                return 0;
            }
            colour.pixel
        }
    }

    pub fn set_input_focus(&self, win: Window) {
        unsafe {
            XSetInputFocus(self.display, win, RevertToPointerRoot, CurrentTime);
        }
    }

    pub fn raise_window(&self, win: Window) {
        unsafe {
            XRaiseWindow(self.display, win);
        }
    }

    /// Configures `win` as a sibling of `sibling` with stack mode `Below`,
    /// mirroring `restack`'s chain-below-the-previous-window loop.
    pub fn stack_below(&self, win: Window, sibling: Window) {
        unsafe {
            let mut changes = XWindowChanges {
                x: 0,
                y: 0,
                width: 0,
                height: 0,
                border_width: 0,
                sibling,
                stack_mode: Below,
            };
            XConfigureWindow(self.display, win, (CWSibling | CWStackMode) as u32, &mut changes);
        }
    }

    /// Drains any queued `EnterNotify` events, mirroring `restack`'s
    /// `while (XCheckMaskEvent(dpy, EnterWindowMask, &ev));` — prevents the
    /// pointer crossing a window just raised/lowered from racing a fresh
    /// focus change.
    pub fn drain_enter_notify(&self) {
        unsafe {
            let mut ev: XEvent = std::mem::zeroed();
            while XCheckMaskEvent(self.display, EnterWindowMask, &mut ev) != 0 {}
        }
    }

    pub fn warp_pointer(&self, win: Window, x: i32, y: i32) {
        unsafe {
            XWarpPointer(self.display, 0, win, 0, 0, 0, 0, x, y);
        }
    }

    pub fn window_attributes(&self, win: Window) -> Option<XWindowAttributes> {
        unsafe {
            let mut wa: XWindowAttributes = std::mem::zeroed();
            if XGetWindowAttributes(self.display, win, &mut wa) == 0 {
                None
            } else {
                Some(wa)
            }
        }
    }

    pub fn transient_for(&self, win: Window) -> Option<Window> {
        unsafe {
            let mut trans: Window = 0;
            if XGetTransientForHint(self.display, win, &mut trans) != 0 && trans != 0 {
                Some(trans)
            } else {
                None
            }
        }
    }

    pub fn size_hints(&self, win: Window) -> SizeHints {
        unsafe {
            let mut hints: XSizeHints = std::mem::zeroed();
            let mut supplied: c_long = 0;
            if XGetWMNormalHints(self.display, win, &mut hints, &mut supplied) == 0 {
                hints.flags = 0;
            }
            let mut out = SizeHints::default();
            if hints.flags & PBaseSize != 0 {
                out.base_w = hints.base_width;
                out.base_h = hints.base_height;
            } else if hints.flags & PMinSize != 0 {
                out.base_w = hints.min_width;
                out.base_h = hints.min_height;
            }
            if hints.flags & PResizeInc != 0 {
                out.inc_w = hints.width_inc;
                out.inc_h = hints.height_inc;
            }
            if hints.flags & PMaxSize != 0 {
                out.max_w = hints.max_width;
                out.max_h = hints.max_height;
            }
            if hints.flags & PMinSize != 0 {
                out.min_w = hints.min_width;
                out.min_h = hints.min_height;
            } else if hints.flags & PBaseSize != 0 {
                out.min_w = hints.base_width;
                out.min_h = hints.base_height;
            }
            if hints.flags & PAspect != 0 {
                out.min_aspect = hints.min_aspect.y as f64 / hints.min_aspect.x as f64;
                out.max_aspect = hints.max_aspect.x as f64 / hints.max_aspect.y as f64;
            }
            out
        }
    }

    pub fn wm_hints_urgent(&self, win: Window) -> Option<bool> {
        unsafe {
            let hints = XGetWMHints(self.display, win);
            if hints.is_null() {
                return None;
            }
            let urgent = (*hints).flags & XUrgencyHint != 0;
            XFree(hints as *mut _);
            Some(urgent)
        }
    }

    /// Strips `XUrgencyHint` from `win`'s `WM_HINTS`, mirroring `clearurgent`
    /// (called once a client that was urgent becomes the selected client).
    pub fn clear_urgent_hint(&self, win: Window) {
        unsafe {
            let hints = XGetWMHints(self.display, win);
            if hints.is_null() {
                return;
            }
            (*hints).flags &= !XUrgencyHint;
            XSetWMHints(self.display, win, hints);
            XFree(hints as *mut _);
        }
    }

    pub fn text_property(&self, win: Window, atom: Atom) -> Option<String> {
        unsafe {
            let mut prop: XTextProperty = std::mem::zeroed();
            if XGetTextProperty(self.display, win, &mut prop, atom) == 0 || prop.nitems == 0 {
                return None;
            }
            let mut list: *mut *mut i8 = ptr::null_mut();
            let mut count: c_int = 0;
            let text = if Xutf8TextPropertyToTextList(self.display, &mut prop, &mut list, &mut count)
                >= Success as i32
                && count > 0
                && !list.is_null()
            {
                let s = std::ffi::CStr::from_ptr(*list).to_string_lossy().into_owned();
                XFreeStringList(list);
                Some(s)
            } else if !prop.value.is_null() {
                Some(
                    std::ffi::CStr::from_ptr(prop.value as *const i8)
                        .to_string_lossy()
                        .into_owned(),
                )
            } else {
                None
            };
            XFree(prop.value as *mut _);
            text
        }
    }

    pub fn class_hint(&self, win: Window) -> (String, String) {
        unsafe {
            let mut hint: XClassHint = std::mem::zeroed();
            if XGetClassHint(self.display, win, &mut hint) == 0 {
                return (String::new(), String::new());
            }
            let class = if hint.res_class.is_null() {
                String::new()
            } else {
                std::ffi::CStr::from_ptr(hint.res_class).to_string_lossy().into_owned()
            };
            let instance = if hint.res_name.is_null() {
                String::new()
            } else {
                std::ffi::CStr::from_ptr(hint.res_name).to_string_lossy().into_owned()
            };
            if !hint.res_class.is_null() {
                XFree(hint.res_class as *mut _);
            }
            if !hint.res_name.is_null() {
                XFree(hint.res_name as *mut _);
            }
            (class, instance)
        }
    }

    pub fn wm_window_type(&self, win: Window) -> Option<Atom> {
        self.get_atom_property(win, self.net.wm_window_type)
    }

    pub fn wm_state_fullscreen_requested(&self, win: Window) -> bool {
        self.get_atom_property(win, self.net.wm_state) == Some(self.net.wm_state_fullscreen)
    }

    fn get_atom_property(&self, win: Window, prop: Atom) -> Option<Atom> {
        unsafe {
            let (mut actual_type, mut actual_format) = (0u64, 0i32);
            let (mut nitems, mut bytes_after) = (0u64, 0u64);
            let mut data: *mut c_uchar = ptr::null_mut();
            let status = XGetWindowProperty(
                self.display,
                win,
                prop,
                0,
                !0,
                False,
                XA_ATOM,
                &mut actual_type,
                &mut actual_format,
                &mut nitems,
                &mut bytes_after,
                &mut data,
            );
            if status != Success as i32 || data.is_null() || nitems == 0 {
                return None;
            }
            let atom = *(data as *const Atom);
            XFree(data as *mut _);
            Some(atom)
        }
    }

    pub fn set_client_state(&self, win: Window, state: c_long) {
        let data = [state, 0];
        unsafe {
            XChangeProperty(
                self.display,
                win,
                self.wm.state,
                self.wm.state,
                32,
                PropModeReplace,
                data.as_ptr() as *const c_uchar,
                2,
            );
        }
    }

    /// Whether `win` declares support for the given ICCCM protocol atom
    /// (e.g. `WM_DELETE_WINDOW`), per `WM_PROTOCOLS`.
    pub fn supports_protocol(&self, win: Window, proto: Atom) -> bool {
        unsafe {
            let mut protocols: *mut Atom = ptr::null_mut();
            let mut count: c_int = 0;
            if XGetWMProtocols(self.display, win, &mut protocols, &mut count) == 0 {
                return false;
            }
            let slice = std::slice::from_raw_parts(protocols, count as usize);
            let found = slice.contains(&proto);
            XFree(protocols as *mut _);
            found
        }
    }

    /// Sends a `ClientMessage` carrying `proto` (e.g. `WM_DELETE_WINDOW`),
    /// mirroring `sendevent`. Returns whether the client supports it.
    pub fn send_protocol(&self, win: Window, proto: Atom) -> bool {
        if !self.supports_protocol(win, proto) {
            return false;
        }
        unsafe {
            let mut ev: XClientMessageEvent = std::mem::zeroed();
            ev.type_ = ClientMessage;
            ev.window = win;
            ev.message_type = self.wm.protocols;
            ev.format = 32;
            ev.data.set_long(0, proto as c_long);
            ev.data.set_long(1, CurrentTime as c_long);
            let mut xev = XEvent { client_message: ev };
            XSendEvent(self.display, win, False, NoEventMask, &mut xev);
        }
        true
    }

    pub fn kill_client(&self, win: Window) {
        unsafe {
            XGrabServer(self.display);
            XSetCloseDownMode(self.display, DestroyAll);
            XKillClient(self.display, win);
            XSync(self.display, False);
            XUngrabServer(self.display);
        }
    }

    pub fn screens(&self) -> Vec<Rect> {
        unsafe {
            if XineramaIsActive(self.display) != 0 {
                let mut n: c_int = 0;
                let info = XineramaQueryScreens(self.display, &mut n);
                if info.is_null() || n == 0 {
                    return vec![self.fallback_screen()];
                }
                let raw = std::slice::from_raw_parts(info, n as usize);
                let mut unique: Vec<XineramaScreenInfo> = Vec::new();
                for s in raw {
                    if !unique
                        .iter()
                        .any(|u| u.x_org == s.x_org && u.y_org == s.y_org && u.width == s.width && u.height == s.height)
                    {
                        unique.push(*s);
                    }
                }
                XFree(info as *mut _);
                unique
                    .into_iter()
                    .map(|s| Rect::new(s.x_org as i32, s.y_org as i32, s.width as i32, s.height as i32))
                    .collect()
            } else {
                vec![self.fallback_screen()]
            }
        }
    }

    fn fallback_screen(&self) -> Rect {
        unsafe {
            Rect::new(
                0,
                0,
                XDisplayWidth(self.display, self.screen),
                XDisplayHeight(self.display, self.screen),
            )
        }
    }

    pub fn query_tree(&self) -> Vec<Window> {
        unsafe {
            let (mut root_ret, mut parent_ret) = (0u64, 0u64);
            let mut children: *mut Window = ptr::null_mut();
            let mut n: u32 = 0;
            if XQueryTree(
                self.display,
                self.root,
                &mut root_ret,
                &mut parent_ret,
                &mut children,
                &mut n,
            ) == 0
            {
                return Vec::new();
            }
            let out = std::slice::from_raw_parts(children, n as usize).to_vec();
            if !children.is_null() {
                XFree(children as *mut _);
            }
            out
        }
    }

    pub fn sync(&self) {
        unsafe {
            XSync(self.display, False);
        }
    }

    pub fn flush(&self) {
        unsafe {
            XFlush(self.display);
        }
    }
}

impl Drop for XConn {
    fn drop(&mut self) {
        unsafe {
            XCloseDisplay(self.display);
        }
    }
}
