use anyhow::{Result, anyhow};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::instrument;
use xcb::{
    Connection, Xid,
    x::{ATOM_ANY, ATOM_NONE, Atom, GetProperty, InternAtom, Window},
};

use super::{AppIdentity, ForegroundProbe};

fn intern_atom(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn read_u32_property(conn: &Connection, window: Window, property: Atom) -> Result<Option<u32>> {
    let reply = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(reply.value::<u32>().first().copied())
}

fn read_window_property(
    conn: &Connection,
    window: Window,
    property: Atom,
) -> Result<Option<Window>> {
    let reply = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(reply.value::<Window>().first().copied())
}

/// Reads `_NET_ACTIVE_WINDOW` from the root window and resolves the owning process through
/// `_NET_WM_PID`.
pub struct X11Probe {
    connection: Connection,
    preferred_screen: usize,
    active_window_atom: Atom,
    pid_atom: Atom,
    system: System,
}

impl X11Probe {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        let active_window_atom = intern_atom(&connection, b"_NET_ACTIVE_WINDOW")?;
        let pid_atom = intern_atom(&connection, b"_NET_WM_PID")?;
        if active_window_atom == ATOM_NONE || pid_atom == ATOM_NONE {
            return Err(anyhow!("Window manager doesn't support EWMH"));
        }
        Ok(Self {
            connection,
            preferred_screen: preferred_screen.max(0) as usize,
            active_window_atom,
            pid_atom,
            system: System::new(),
        })
    }

    fn executable_of(&mut self, pid: u32) -> Result<String> {
        let pid = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = self
            .system
            .process(pid)
            .ok_or_else(|| anyhow!("Process {pid} of the focused window is gone"))?;
        process
            .exe()
            .and_then(|v| v.to_str())
            .map(|v| v.to_string())
            .ok_or_else(|| anyhow!("Executable of process {pid} is not accessible"))
    }
}

impl ForegroundProbe for X11Probe {
    #[instrument(skip(self))]
    fn probe(&mut self) -> Result<AppIdentity> {
        let root = self
            .connection
            .get_setup()
            .roots()
            .nth(self.preferred_screen)
            .ok_or_else(|| anyhow!("Screen {} is not available", self.preferred_screen))?
            .root();

        let active_window = read_window_property(&self.connection, root, self.active_window_atom)?
            .filter(|window| !window.is_none())
            .ok_or_else(|| anyhow!("No focused window"))?;
        let pid = read_u32_property(&self.connection, active_window, self.pid_atom)?
            .ok_or_else(|| anyhow!("Focused window doesn't expose a pid"))?;

        let executable = self.executable_of(pid)?;
        Ok(AppIdentity::from_executable(&executable))
    }
}
