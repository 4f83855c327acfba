//! Error type shared by the framebuffer/graphics and roulette-animation
//! syscall plumbing.

/// Failure modes the video subsystem reports back through its syscalls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoError {
    NoFramebuffer,
    Invalid,
}

/// Result alias used throughout the video syscall surface; these calls never
/// return a success payload beyond "it happened".
pub type VideoResult = Result<(), VideoError>;
