//! ICCCM/EWMH atom table (§6.2), interned once at startup.

use x11::xlib::{Atom, Display, False, XInternAtom};

macro_rules! atom_table {
    ($name:ident { $($field:ident => $atom_name:expr),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy)]
        pub struct $name {
            $(pub $field: Atom),+
        }

        impl $name {
            pub fn intern(display: *mut Display) -> Self {
                $name {
                    $($field: unsafe {
                        let name = concat!($atom_name, "\0");
                        XInternAtom(display, name.as_ptr() as *const i8, False)
                    }),+
                }
            }
        }
    };
}

atom_table!(WmAtoms {
    protocols => "WM_PROTOCOLS",
    delete_window => "WM_DELETE_WINDOW",
    state => "WM_STATE",
    take_focus => "WM_TAKE_FOCUS",
});

atom_table!(NetAtoms {
    supported => "_NET_SUPPORTED",
    wm_name => "_NET_WM_NAME",
    wm_state => "_NET_WM_STATE",
    wm_state_fullscreen => "_NET_WM_STATE_FULLSCREEN",
    wm_window_type => "_NET_WM_WINDOW_TYPE",
    wm_window_type_dialog => "_NET_WM_WINDOW_TYPE_DIALOG",
    wm_window_type_notification => "_NET_WM_WINDOW_TYPE_NOTIFICATION",
    active_window => "_NET_ACTIVE_WINDOW",
    client_list => "_NET_CLIENT_LIST",
});

impl NetAtoms {
    /// All atoms advertised in `_NET_SUPPORTED`.
    pub fn supported_list(&self) -> [Atom; 7] {
        [
            self.supported,
            self.wm_name,
            self.wm_state,
            self.wm_state_fullscreen,
            self.wm_window_type,
            self.wm_window_type_dialog,
            self.active_window,
            // client_list omitted deliberately: dwm advertises it but does
            // not list it in the fixed `netatom` supported array either.
        ]
    }
}
