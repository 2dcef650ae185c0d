pub mod clusters;
pub mod fit;
pub mod score;

use crate::utils::progress::CliProgressHandler;

fn progress_handler(show_progress: bool) -> CliProgressHandler {
    if show_progress {
        CliProgressHandler::new()
    } else {
        CliProgressHandler::hidden()
    }
}
