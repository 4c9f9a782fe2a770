//! The update thread: input, animation and camera control off the render thread.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error};

use renderer_core::Timer;
use renderer_platform::{InputState, KeyEvent};
use renderer_scene::{Camera, SceneError, SceneMessage, SceneResult, SceneSender};

use crate::error::{RendererError, RendererResult};

/// Updates closer together than this are skipped.
pub const MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(1);

/// Runs the user's animation callback and the camera controller in a loop,
/// posting the results to the render thread through a [`SceneSender`].
///
/// Dropping the handle stops and joins the thread.
pub struct UpdateThread {
    keys: Option<Sender<KeyEvent>>,
    handle: Option<JoinHandle<()>>,
}

impl UpdateThread {
    /// Spawn the loop. `animate` gets the scene queue and the elapsed time
    /// since the previous update.
    pub fn spawn<F>(sender: SceneSender, camera: Camera, animate: F) -> RendererResult<Self>
    where
        F: FnMut(&SceneSender, Duration) -> SceneResult<()> + Send + 'static,
    {
        let (keys, key_events) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("update".to_string())
            .spawn(move || run(sender, camera, key_events, animate))
            .map_err(|source| RendererError::Spawn {
                name: "update",
                source,
            })?;
        Ok(Self {
            keys: Some(keys),
            handle: Some(handle),
        })
    }

    /// Forward a key transition from the event loop.
    pub fn send_key(&self, event: KeyEvent) {
        if let Some(keys) = &self.keys
            && keys.send(event).is_err()
        {
            // The thread only goes away on its own once the render side is gone.
            debug!("Update thread has stopped, dropping {:?}", event);
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for UpdateThread {
    fn drop(&mut self) {
        // Closing the key channel is the stop signal.
        self.keys.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("Update thread panicked");
        }
    }
}

fn run<F>(sender: SceneSender, mut camera: Camera, key_events: Receiver<KeyEvent>, mut animate: F)
where
    F: FnMut(&SceneSender, Duration) -> SceneResult<()>,
{
    debug!("Update thread started");
    let mut input = InputState::new();
    let mut timer = Timer::new();

    loop {
        // Keys arriving before the next update is due are folded into it;
        // a steady stream of them never holds the update back.
        let wait = MIN_UPDATE_INTERVAL.saturating_sub(timer.peek());
        match key_events.recv_timeout(wait) {
            Ok(event) => input.apply(event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        for event in key_events.try_iter() {
            input.apply(event);
        }

        let Some(delta) = timer.tick_at_least(MIN_UPDATE_INTERVAL) else {
            continue;
        };
        if let Err(e) = step(&sender, &mut camera, &input, delta, &mut animate) {
            match e {
                SceneError::Disconnected => debug!("Render side closed, stopping update thread"),
                other => error!("Update failed: {}", other),
            }
            break;
        }
        input.begin_frame();
    }
    debug!("Update thread stopped");
}

fn step<F>(
    sender: &SceneSender,
    camera: &mut Camera,
    input: &InputState,
    delta: Duration,
    animate: &mut F,
) -> SceneResult<()>
where
    F: FnMut(&SceneSender, Duration) -> SceneResult<()>,
{
    animate(sender, delta)?;

    if let Camera::Controlled { view, controller } = camera {
        controller.apply(input, delta.as_secs_f32(), view);
    }
    let view = camera.view_mut();
    if view.is_changed() {
        sender.send(SceneMessage::Camera(view.take_state()))?;
    }
    Ok(())
}
