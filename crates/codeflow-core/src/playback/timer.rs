//! Timer-driven playback.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;

use super::{PlaybackController, PlaybackState};

/// Animates a [`PlaybackController`] on a background tokio task.
///
/// Every change (timer tick or control call) is published on a watch
/// channel. The timer task belongs to the player and is aborted when the
/// player is dropped, so no timer outlives its owner.
pub struct Player {
    controller: Arc<Mutex<PlaybackController>>,
    state_tx: Arc<watch::Sender<PlaybackState>>,
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

impl Player {
    /// Starts the timer task. Must be called inside a tokio runtime.
    pub fn spawn(controller: PlaybackController) -> Self {
        let (state_tx, _) = watch::channel(controller.state());
        let state_tx = Arc::new(state_tx);
        let controller = Arc::new(Mutex::new(controller));
        let wake = Arc::new(Notify::new());

        let task = tokio::spawn(run_timer(
            Arc::clone(&controller),
            Arc::clone(&state_tx),
            Arc::clone(&wake),
        ));

        Player {
            controller,
            state_tx,
            wake,
            task,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }

    pub async fn state(&self) -> PlaybackState {
        self.controller.lock().await.state()
    }

    /// Applies `f` to the controller, publishes the new state and wakes the
    /// timer so play/pause/speed changes take effect immediately.
    pub async fn control<R>(&self, f: impl FnOnce(&mut PlaybackController) -> R) -> R {
        let (result, state) = {
            let mut controller = self.controller.lock().await;
            let result = f(&mut controller);
            (result, controller.state())
        };
        self.state_tx.send_replace(state);
        self.wake.notify_one();
        result
    }

    pub async fn play(&self) {
        self.control(|c| c.play()).await
    }

    pub async fn pause(&self) {
        self.control(|c| c.pause()).await
    }

    /// Stops the timer. Later control calls still update the state but
    /// nothing advances on its own.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_timer(
    controller: Arc<Mutex<PlaybackController>>,
    state_tx: Arc<watch::Sender<PlaybackState>>,
    wake: Arc<Notify>,
) {
    loop {
        let (playing, speed_ms) = {
            let c = controller.lock().await;
            (c.is_playing(), c.speed_ms())
        };
        if !playing {
            wake.notified().await;
            continue;
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(speed_ms)) => {
                let state = {
                    let mut c = controller.lock().await;
                    c.tick();
                    c.state()
                };
                tracing::trace!("playback tick -> step {}", state.current_index);
                state_tx.send_replace(state);
            }
            _ = wake.notified() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn advances_on_timer_and_stops_at_end() {
        let player = Player::spawn(PlaybackController::new(3));
        let mut rx = player.subscribe();
        player.control(|c| c.set_speed(100)).await;
        player.play().await;

        tokio::time::sleep(Duration::from_millis(350)).await;
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.current_index, 2);
        assert!(!state.is_playing);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_advancing() {
        let player = Player::spawn(PlaybackController::new(10));
        player.control(|c| c.set_speed(100)).await;
        player.play().await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        player.pause().await;
        let paused_at = player.state().await.current_index;
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(player.state().await.current_index, paused_at);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_player_cancels_timer() {
        let player = Player::spawn(PlaybackController::new(10));
        let rx = player.subscribe();
        player.play().await;
        drop(player);
        tokio::time::sleep(Duration::from_millis(5000)).await;
        // The sender lives only inside the player and its task.
        assert!(rx.has_changed().is_err());
    }
}
