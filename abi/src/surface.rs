//! Reserved for client-side surface abstractions. Userland's `appkit` crate
//! defines its own `Surface`/`SurfaceError` locally; nothing in the kernel
//! ABI currently needs a shared type here.
