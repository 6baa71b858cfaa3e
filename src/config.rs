//! Static configuration (K): key/button/rule/layout/colour tables, read by
//! the core as compile-time data (§6.3), plus the handful of scalars that
//! legitimately vary at runtime (border width, gaps, fonts, colours...),
//! loaded the way the teacher's `Config` loaded its TOML file.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use x11::keysym::*;
use x11::xlib::KeySym;

use crate::error::{Result, WmError};
use crate::layout::LayoutKind;

/// Workspace names. §3 invariant I6: count must be <= 31 so a `u32` bitmask
/// suffices; enforced with a const assertion rather than a runtime check.
pub const TAGS: [&str; 9] = ["1", "2", "3", "4", "5", "6", "7", "8", "9"];
const _TAG_COUNT_FITS_U32: [(); 1] = [(); (TAGS.len() <= 31) as usize];

/// All bits a client/view may legally occupy.
pub fn tag_mask() -> u32 {
    (1u32 << TAGS.len()) - 1
}

/// Window-rule matching, in declaration order; the last matching rule's
/// monitor wins (§9 "Rules as data").
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub class: Option<&'static str>,
    pub instance: Option<&'static str>,
    pub title: Option<&'static str>,
    pub tags: u32,
    pub floating: bool,
    pub monitor: i32,
}

pub static RULES: &[Rule] = &[
    Rule {
        class: Some("Gimp"),
        instance: None,
        title: None,
        tags: 0,
        floating: true,
        monitor: -1,
    },
    Rule {
        class: Some("Firefox"),
        instance: None,
        title: None,
        tags: 1 << 8,
        floating: false,
        monitor: -1,
    },
];

/// The ordered layout table; index 0 is the default for new monitors.
pub static LAYOUTS: [LayoutKind; 5] = crate::layout::ALL_LAYOUTS;

/// Scroll/cycle direction, replacing dwm's overloaded `+1`/`-1` `Arg.i` for
/// `focusstack` with a small enum (§9 open question: "expect a cleaner enum
/// in a rewrite" — this is it; the arrow-key bindings below map onto these
/// two cases exactly as before).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackDirection {
    Next,
    Prev,
}

/// The argument carried by a user action, replacing dwm's `Arg` union with
/// a Rust enum — same dynamic-typing role, statically checked per action.
#[derive(Debug, Clone, Copy)]
pub enum Action {
    View(u32),
    ToggleView(u32),
    Tag(u32),
    ToggleTag(u32),
    FocusStack(StackDirection),
    /// `dir_to_monitor` semantics (§9 open question): this is an absolute
    /// monitor index, not a signed delta, despite the historical name.
    FocusMon(i32),
    TagMon(i32),
    Zoom,
    KillClient,
    SetLayout(Option<LayoutKind>),
    /// `>= 1.0` sets `mfact` absolutely; otherwise it's a delta.
    SetMFact(f32),
    ToggleFloating,
    ToggleBar,
    MoveMouse,
    ResizeMouse,
    Spawn(&'static [&'static str]),
    Quit,
}

#[derive(Debug, Clone, Copy)]
pub struct Key {
    pub modifiers: u32,
    pub keysym: KeySym,
    pub action: Action,
}

/// Click regions a `ButtonPress` on the bar or a client window resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickRegion {
    TagBar,
    LayoutSymbol,
    StatusText,
    WinTitle,
    ClientWin,
    RootWin,
}

#[derive(Debug, Clone, Copy)]
pub struct Button {
    pub click: ClickRegion,
    pub modifiers: u32,
    pub button: u32,
    pub action: Action,
}

const TERM_CMD: &[&str] = &["urxvtc"];
const LAUNCHER_CMD: &[&str] = &["dmenu_run"];

macro_rules! tag_keys {
    ($modkey:expr, $key:expr, $tag:expr) => {
        [
            Key {
                modifiers: $modkey,
                keysym: $key,
                action: Action::View(1 << $tag),
            },
            Key {
                modifiers: $modkey | x11::xlib::ControlMask,
                keysym: $key,
                action: Action::ToggleView(1 << $tag),
            },
            Key {
                modifiers: $modkey | x11::xlib::ShiftMask,
                keysym: $key,
                action: Action::Tag(1 << $tag),
            },
            Key {
                modifiers: $modkey | x11::xlib::ControlMask | x11::xlib::ShiftMask,
                keysym: $key,
                action: Action::ToggleTag(1 << $tag),
            },
        ]
    };
}

pub const MODKEY: u32 = x11::xlib::Mod4Mask;

lazy_static::lazy_static! {
    /// Key bindings, in grab order. `grabkeys` walks this once per numlock
    /// combination (§0.1 "numlock handling").
    pub static ref KEYS: Vec<Key> = {
        let mut keys = vec![
            Key { modifiers: MODKEY, keysym: XK_p as KeySym, action: Action::Spawn(LAUNCHER_CMD) },
            Key { modifiers: MODKEY | x11::xlib::ShiftMask, keysym: XK_Return as KeySym, action: Action::Spawn(TERM_CMD) },
            Key { modifiers: MODKEY, keysym: XK_b as KeySym, action: Action::ToggleBar },
            Key { modifiers: MODKEY, keysym: XK_j as KeySym, action: Action::FocusStack(StackDirection::Next) },
            Key { modifiers: MODKEY, keysym: XK_k as KeySym, action: Action::FocusStack(StackDirection::Prev) },
            Key { modifiers: MODKEY, keysym: XK_i as KeySym, action: Action::SetMFact(-0.05) },
            Key { modifiers: MODKEY, keysym: XK_o as KeySym, action: Action::SetMFact(0.05) },
            Key { modifiers: MODKEY, keysym: XK_Return as KeySym, action: Action::Zoom },
            Key { modifiers: MODKEY, keysym: XK_Tab as KeySym, action: Action::View(0) },
            Key { modifiers: MODKEY | x11::xlib::ShiftMask, keysym: XK_c as KeySym, action: Action::KillClient },
            Key { modifiers: MODKEY, keysym: XK_t as KeySym, action: Action::SetLayout(Some(LayoutKind::Tile)) },
            Key { modifiers: MODKEY, keysym: XK_f as KeySym, action: Action::SetLayout(Some(LayoutKind::Floating)) },
            Key { modifiers: MODKEY, keysym: XK_m as KeySym, action: Action::SetLayout(Some(LayoutKind::Monocle)) },
            Key { modifiers: MODKEY, keysym: XK_space as KeySym, action: Action::SetLayout(None) },
            Key { modifiers: MODKEY | x11::xlib::ShiftMask, keysym: XK_space as KeySym, action: Action::ToggleFloating },
            Key { modifiers: MODKEY, keysym: XK_0 as KeySym, action: Action::View(!0) },
            Key { modifiers: MODKEY | x11::xlib::ShiftMask, keysym: XK_0 as KeySym, action: Action::Tag(!0) },
            Key { modifiers: MODKEY, keysym: XK_comma as KeySym, action: Action::FocusMon(0) },
            Key { modifiers: MODKEY, keysym: XK_period as KeySym, action: Action::FocusMon(1) },
            Key { modifiers: MODKEY | x11::xlib::ShiftMask, keysym: XK_comma as KeySym, action: Action::TagMon(0) },
            Key { modifiers: MODKEY | x11::xlib::ShiftMask, keysym: XK_period as KeySym, action: Action::TagMon(1) },
            Key { modifiers: MODKEY | x11::xlib::ShiftMask, keysym: XK_q as KeySym, action: Action::Quit },
        ];
        for (i, key) in [XK_1, XK_2, XK_3, XK_4, XK_5, XK_6, XK_7, XK_8, XK_9].into_iter().enumerate() {
            keys.extend(tag_keys!(MODKEY, key as KeySym, i));
        }
        keys
    };

    pub static ref BUTTONS: Vec<Button> = vec![
        Button { click: ClickRegion::LayoutSymbol, modifiers: 0, button: x11::xlib::Button1, action: Action::SetLayout(None) },
        Button { click: ClickRegion::LayoutSymbol, modifiers: 0, button: x11::xlib::Button3, action: Action::SetLayout(Some(LayoutKind::Monocle)) },
        Button { click: ClickRegion::WinTitle, modifiers: 0, button: x11::xlib::Button2, action: Action::Zoom },
        Button { click: ClickRegion::ClientWin, modifiers: MODKEY, button: x11::xlib::Button1, action: Action::MoveMouse },
        Button { click: ClickRegion::ClientWin, modifiers: MODKEY, button: x11::xlib::Button2, action: Action::ToggleFloating },
        Button { click: ClickRegion::ClientWin, modifiers: MODKEY, button: x11::xlib::Button3, action: Action::ResizeMouse },
        Button { click: ClickRegion::TagBar, modifiers: 0, button: x11::xlib::Button1, action: Action::View(0) },
        Button { click: ClickRegion::TagBar, modifiers: 0, button: x11::xlib::Button3, action: Action::ToggleView(0) },
        Button { click: ClickRegion::TagBar, modifiers: MODKEY, button: x11::xlib::Button1, action: Action::Tag(0) },
        Button { click: ClickRegion::TagBar, modifiers: MODKEY, button: x11::xlib::Button3, action: Action::ToggleTag(0) },
    ];
}

/// One of the two colour schemes (normal/selected), `(border, fg, bg)` hex
/// strings per §6.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColourScheme {
    pub border: String,
    pub fg: String,
    pub bg: String,
}

impl Default for ColourScheme {
    fn default() -> Self {
        ColourScheme {
            border: "#444444".into(),
            fg: "#bbbbbb".into(),
            bg: "#222222".into(),
        }
    }
}

fn default_selected_scheme() -> ColourScheme {
    ColourScheme {
        border: "#00bfff".into(),
        fg: "#eeeeee".into(),
        bg: "#005577".into(),
    }
}

fn default_true() -> bool {
    true
}
fn default_mfact() -> f32 {
    0.55
}
fn default_nmaster() -> u32 {
    1
}
fn default_border_px() -> i32 {
    1
}
fn default_snap() -> i32 {
    32
}
fn default_gap() -> i32 {
    6
}
fn default_fonts() -> Vec<String> {
    vec!["monospace:size=10".into()]
}

/// The scalars and colours that legitimately vary at runtime. Loaded from
/// TOML (matching the teacher's `Config::get_config`) with defaults that
/// mirror dwm's historical `config.h` values when no file is present or a
/// field is omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mfact: f32,
    pub nmaster: u32,
    pub border_px: i32,
    pub snap: i32,
    pub window_gap: i32,
    pub show_bar: bool,
    pub top_bar: bool,
    /// Whether tiled clients also respect ICCCM size hints (§4.1 step 4).
    pub resize_hints: bool,
    pub fonts: Vec<String>,
    pub normal: ColourScheme,
    pub selected: ColourScheme,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            mfact: default_mfact(),
            nmaster: default_nmaster(),
            border_px: default_border_px(),
            snap: default_snap(),
            window_gap: default_gap(),
            show_bar: default_true(),
            top_bar: default_true(),
            resize_hints: default_true(),
            fonts: default_fonts(),
            normal: ColourScheme::default(),
            selected: default_selected_scheme(),
        }
    }
}

impl Settings {
    /// XDG config path: `$XDG_CONFIG_HOME/rdwm/config.toml`, falling back
    /// to `~/.config/rdwm/config.toml`.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("rdwm").join("config.toml"))
    }

    /// Loads settings from the XDG path if present, else compiled defaults.
    /// A present-but-malformed file is a hard `WmError` (§7 "font/colour
    /// load failure is fatal at startup"); an absent file is not an error.
    pub fn load() -> Result<Self> {
        let Some(path) = Self::config_path() else {
            return Ok(Settings::default());
        };
        if !path.exists() {
            return Ok(Settings::default());
        }
        let path_str = path.display().to_string();
        let contents = fs::read_to_string(&path).map_err(|source| WmError::ConfigRead {
            path: path_str.clone(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| WmError::ConfigParse {
            path: path_str,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_dwm_config_h() {
        let s = Settings::default();
        assert_eq!(s.border_px, 1);
        assert_eq!(s.snap, 32);
        assert_eq!(s.window_gap, 6);
        assert!(s.show_bar);
        assert!(s.top_bar);
        assert_eq!(s.nmaster, 1);
        assert!((s.mfact - 0.55).abs() < f32::EPSILON);
    }

    #[test]
    fn tag_count_fits_bitmask() {
        assert!(TAGS.len() <= 31);
        assert_eq!(tag_mask(), 0x1FF);
    }

    #[test]
    fn toml_round_trips_settings() {
        let s = Settings::default();
        let text = toml::to_string(&s).unwrap();
        let back: Settings = toml::from_str(&text).unwrap();
        assert_eq!(back.border_px, s.border_px);
        assert_eq!(back.normal.bg, s.normal.bg);
    }
}
