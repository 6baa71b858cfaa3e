//! Bar rendering (the "R" external collaborator, §2): kept behind a small
//! `Renderer` trait so the core only ever asks for `draw_text`/`draw_rect`/
//! `map_region` against a named colour scheme, never touching Xlib GC state
//! directly — the opaque boundary the spec calls for.

use std::collections::HashMap;
use std::ffi::CString;

use libc::{c_int, c_uint};
use x11::xlib::{self, Drawable, GContext, Window, XFontStruct};

use crate::config::{ColourScheme, Settings};
use crate::xconn::XConn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Normal,
    Selected,
}

pub trait Renderer {
    fn text_width(&self, text: &str) -> i32;
    fn draw_text(&mut self, drawable: Drawable, x: i32, w: i32, text: &str, scheme: Scheme, urgent: bool);
    fn draw_rect(&mut self, drawable: Drawable, x: i32, y: i32, w: i32, h: i32, filled: bool, scheme: Scheme);
    fn bar_height(&self) -> i32;
}

/// Core-font based renderer: the teacher's stack carries no Xft/Pango
/// dependency, so the bar uses classic `XLoadQueryFont`/`XDrawString`
/// the way pre-Xft dwm did, rather than importing a new font stack.
pub struct XlibRenderer {
    display: *mut xlib::Display,
    font: *mut XFontStruct,
    gc: GContext,
    bar_height: i32,
    pixels: HashMap<(Scheme, &'static str), u64>,
}

impl XlibRenderer {
    pub fn new(conn: &XConn, settings: &Settings) -> Self {
        let font_name = settings
            .fonts
            .first()
            .cloned()
            .unwrap_or_else(|| "fixed".into());
        let cstr = CString::new(font_name).unwrap();
        let (font, bar_height) = unsafe {
            let font = xlib::XLoadQueryFont(conn.display, cstr.as_ptr());
            let font = if font.is_null() {
                xlib::XLoadQueryFont(conn.display, CString::new("fixed").unwrap().as_ptr())
            } else {
                font
            };
            let height = if font.is_null() {
                16
            } else {
                (*font).ascent + (*font).descent + 2
            };
            (font, height)
        };
        let gc = unsafe { xlib::XCreateGC(conn.display, conn.root, 0, std::ptr::null_mut()) };

        let mut pixels = HashMap::new();
        for scheme in [Scheme::Normal, Scheme::Selected] {
            let cs: &ColourScheme = match scheme {
                Scheme::Normal => &settings.normal,
                Scheme::Selected => &settings.selected,
            };
            pixels.insert((scheme, "fg"), conn.alloc_colour(&cs.fg));
            pixels.insert((scheme, "bg"), conn.alloc_colour(&cs.bg));
            pixels.insert((scheme, "border"), conn.alloc_colour(&cs.border));
        }

        XlibRenderer {
            display: conn.display,
            font,
            gc,
            bar_height,
            pixels,
        }
    }

    fn pixel(&self, scheme: Scheme, which: &'static str) -> u64 {
        *self.pixels.get(&(scheme, which)).unwrap_or(&0)
    }
}

impl Renderer for XlibRenderer {
    fn text_width(&self, text: &str) -> i32 {
        if self.font.is_null() {
            return text.len() as i32 * 8 + 8;
        }
        unsafe {
            let cstr = CString::new(text).unwrap_or_default();
            xlib::XTextWidth(self.font, cstr.as_ptr(), text.len() as c_int) + 8
        }
    }

    fn draw_text(&mut self, drawable: Drawable, x: i32, w: i32, text: &str, scheme: Scheme, urgent: bool) {
        let (fg, bg) = if urgent {
            (self.pixel(Scheme::Normal, "bg"), self.pixel(Scheme::Normal, "fg"))
        } else {
            (self.pixel(scheme, "fg"), self.pixel(scheme, "bg"))
        };
        unsafe {
            xlib::XSetForeground(self.display, self.gc, bg);
            xlib::XFillRectangle(self.display, drawable, self.gc, x, 0, w as c_uint, self.bar_height as c_uint);
            if !text.is_empty() {
                xlib::XSetForeground(self.display, self.gc, fg);
                let cstr = CString::new(text).unwrap_or_default();
                let y = (self.bar_height + unsafe_ascent(self.font)) / 2 - 1;
                xlib::XDrawString(self.display, drawable, self.gc, x + 4, y, cstr.as_ptr(), text.len() as c_int);
            }
        }
    }

    fn draw_rect(&mut self, drawable: Drawable, x: i32, y: i32, w: i32, h: i32, filled: bool, scheme: Scheme) {
        unsafe {
            xlib::XSetForeground(self.display, self.gc, self.pixel(scheme, "fg"));
            if filled {
                xlib::XFillRectangle(self.display, drawable, self.gc, x, y, w as c_uint, h as c_uint);
            } else {
                xlib::XDrawRectangle(self.display, drawable, self.gc, x, y, w as c_uint - 1, h as c_uint - 1);
            }
        }
    }

    fn bar_height(&self) -> i32 {
        self.bar_height
    }
}

fn unsafe_ascent(font: *mut XFontStruct) -> i32 {
    if font.is_null() {
        12
    } else {
        unsafe { (*font).ascent }
    }
}

/// Creates the per-monitor bar window, mirroring `updatebars`.
pub fn create_bar_window(conn: &XConn, x: i32, y: i32, width: i32, height: i32) -> Window {
    unsafe {
        let mut attrs: xlib::XSetWindowAttributes = std::mem::zeroed();
        attrs.override_redirect = xlib::True;
        attrs.background_pixmap = xlib::ParentRelative as u64;
        attrs.event_mask = xlib::ButtonPressMask | xlib::ExposureMask;
        let win = xlib::XCreateWindow(
            conn.display,
            conn.root,
            x,
            y,
            width as c_uint,
            height as c_uint,
            0,
            xlib::CopyFromParent,
            xlib::InputOutput as c_uint,
            std::ptr::null_mut(),
            xlib::CWOverrideRedirect | xlib::CWBackPixmap | xlib::CWEventMask,
            &mut attrs,
        );
        xlib::XDefineCursor(conn.display, win, conn.cursor_normal);
        xlib::XMapRaised(conn.display, win);
        win
    }
}

/// Left-to-right hit test matching dwm's `buttonpress` scan: tag cells,
/// then the layout symbol, then (on the selected monitor) status text,
/// else the window title (§0.1 "bar click hit-testing").
pub fn hit_test(
    click_x: i32,
    tag_widths: &[i32],
    lt_symbol_width: i32,
    status_width: i32,
    bar_width: i32,
    is_selected_monitor: bool,
) -> crate::config::ClickRegion {
    use crate::config::ClickRegion;

    let mut x = 0;
    for w in tag_widths {
        x += w;
        if click_x < x {
            return ClickRegion::TagBar;
        }
    }
    x += lt_symbol_width;
    if click_x < x {
        return ClickRegion::LayoutSymbol;
    }
    if is_selected_monitor && click_x > bar_width - status_width {
        return ClickRegion::StatusText;
    }
    ClickRegion::WinTitle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_test_walks_tags_then_symbol_then_title() {
        let widths = [40, 40, 40];
        assert_eq!(hit_test(10, &widths, 30, 50, 500, true), crate::config::ClickRegion::TagBar);
        assert_eq!(hit_test(100, &widths, 30, 50, 500, true), crate::config::ClickRegion::LayoutSymbol);
        assert_eq!(hit_test(480, &widths, 30, 50, 500, true), crate::config::ClickRegion::StatusText);
        assert_eq!(hit_test(200, &widths, 30, 50, 500, true), crate::config::ClickRegion::WinTitle);
    }

    #[test]
    fn status_text_region_only_on_selected_monitor() {
        let widths = [40];
        assert_eq!(hit_test(480, &widths, 30, 50, 500, false), crate::config::ClickRegion::WinTitle);
    }
}
