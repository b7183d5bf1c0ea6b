//! Windows message thread and COM setup
//!
//! One dedicated thread owns every OS registration: the hidden listener window,
//! the WinEvent hooks and the endpoint notification client. Out-of-context
//! WinEvent callbacks and window messages are delivered to that thread's message
//! loop, so the callbacks find the event sender in a thread-local.

use color_eyre::eyre::{self, Context, Result};
use std::cell::RefCell;
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};
use windows::Win32::Foundation::{LPARAM, WPARAM};
use windows::Win32::System::Com::{COINIT_MULTITHREADED, CoInitializeEx, CoUninitialize};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, GetMessageW, MSG, PostThreadMessageW, TranslateMessage, WM_QUIT,
};

use super::{EventSender, PlatformEvent};
use crate::audio::windows::EndpointWatcher;
use crate::display::windows::ListenerWindow;
use crate::focus::windows::FocusHooks;

thread_local! {
    static EVENTS: RefCell<Option<EventSender>> = const { RefCell::new(None) };
    static COM: RefCell<Option<ComGuard>> = const { RefCell::new(None) };
}

/// Forward an event from an OS callback running on the message thread
pub(crate) fn emit(event: PlatformEvent) {
    EVENTS.with(|events| {
        if let Some(tx) = events.borrow().as_ref() {
            // Receiver gone means the daemon is shutting down
            let _ = tx.send(event);
        }
    });
}

struct ComGuard;

impl Drop for ComGuard {
    fn drop(&mut self) {
        unsafe { CoUninitialize() };
    }
}

/// Initialize COM (multithreaded apartment) on the calling thread, once
///
/// # Errors
/// Returns an error if the thread already joined a single-threaded apartment.
pub(crate) fn ensure_com() -> Result<()> {
    COM.with(|com| {
        if com.borrow().is_some() {
            return Ok(());
        }
        unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) }
            .ok()
            .context("CoInitializeEx failed")?;
        *com.borrow_mut() = Some(ComGuard);
        Ok(())
    })
}

/// Owns the message thread; dropping it tears down every registration and joins the thread
pub(crate) struct MessageThread {
    thread_id: u32,
    handle: Option<JoinHandle<()>>,
}

impl MessageThread {
    /// Spawn the thread and wait until all registrations are in place
    ///
    /// # Errors
    /// Returns an error if any registration fails; the thread has exited by then.
    pub fn spawn(tx: EventSender) -> Result<Self> {
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<u32>>();

        let handle = thread::Builder::new()
            .name("masw-os-events".to_string())
            .spawn(move || run(tx, &ready_tx))
            .context("Failed to spawn OS event thread")?;

        match ready_rx.recv() {
            Ok(Ok(thread_id)) => Ok(Self {
                thread_id,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                eyre::bail!("OS event thread exited during setup")
            }
        }
    }
}

impl Drop for MessageThread {
    fn drop(&mut self) {
        if let Err(e) =
            unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) }
        {
            warn!("Failed to stop OS event thread: {}", e);
            return;
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("OS event thread panicked");
            }
        }
        debug!("OS event thread stopped");
    }
}

/// Registrations live on this thread's stack; they drop in reverse order after the loop ends
fn run(tx: EventSender, ready: &std_mpsc::Sender<Result<u32>>) {
    EVENTS.with(|events| *events.borrow_mut() = Some(tx.clone()));

    let setup = || -> Result<(ListenerWindow, FocusHooks, EndpointWatcher)> {
        ensure_com()?;
        let window = ListenerWindow::create()?;
        let hooks = FocusHooks::install()?;
        let watcher = EndpointWatcher::register(tx)?;
        Ok((window, hooks, watcher))
    };

    let registrations = match setup() {
        Ok(registrations) => registrations,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let _ = ready.send(Ok(unsafe { GetCurrentThreadId() }));
    debug!("OS event thread running");

    let mut msg = MSG::default();
    loop {
        let ret = unsafe { GetMessageW(&mut msg, None, 0, 0) };
        match ret.0 {
            0 => break,
            -1 => {
                error!("GetMessageW failed: {}", windows::core::Error::from_win32());
                break;
            }
            _ => unsafe {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            },
        }
    }

    drop(registrations);
    EVENTS.with(|events| events.borrow_mut().take());
}
