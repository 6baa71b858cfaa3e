#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

mod atoms;
mod bar;
mod config;
mod error;
mod event;
mod geometry;
mod layout;
mod model;
mod spawn;
mod xconn;

use env_logger::WriteStyle::Auto;

use bar::XlibRenderer;
use config::Settings;
use event::Manager;
use xconn::XConn;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn usage() -> ! {
    eprintln!("usage: rdwm [-v]");
    std::process::exit(1);
}

fn parse_args() {
    let mut args = std::env::args().skip(1);
    if let Some(arg) = args.next() {
        if arg == "-v" {
            println!("rdwm-{VERSION}");
            std::process::exit(0);
        }
        usage();
    }
}

fn main() {
    parse_args();

    env_logger::builder()
        .format_timestamp(None)
        .write_style(Auto)
        .init();
    info!("starting rdwm {VERSION}");

    let settings = Settings::load().unwrap_or_else(|e| {
        error!("{e}");
        std::process::exit(1);
    });

    let conn = XConn::open().unwrap_or_else(|e| {
        error!("{e}");
        std::process::exit(1);
    });

    let renderer = XlibRenderer::new(&conn, &settings);
    let mut manager = Manager::new(conn, settings, renderer);
    manager.setup();
    manager.scan();
    manager.run();
    cleanup(&mut manager);
    info!("exiting");
}

/// Mirrors dwm's `cleanup`: unmanage every remaining client, restore input
/// focus to the root, and strip the EWMH properties this manager owns
/// before the display connection closes (`XConn::drop`).
fn cleanup(manager: &mut Manager<XlibRenderer>) {
    let wins: Vec<_> = manager.world.clients.keys().copied().collect();
    for win in wins {
        manager.world.detach(win);
        manager.world.detach_stack(win);
        manager.world.clients.remove(&win);
    }
    unsafe {
        x11::xlib::XSetInputFocus(
            manager.conn.display,
            x11::xlib::PointerRoot as x11::xlib::Window,
            x11::xlib::RevertToPointerRoot,
            x11::xlib::CurrentTime,
        );
        x11::xlib::XDeleteProperty(manager.conn.display, manager.conn.root, manager.conn.net.active_window);
        x11::xlib::XDeleteProperty(manager.conn.display, manager.conn.root, manager.conn.net.supported);
    }
    manager.conn.sync();
}
