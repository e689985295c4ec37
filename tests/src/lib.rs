//! Intentionally empty: this package exists only to host the end-to-end
//! scenario tests under `tests/`, exercised against the other workspace
//! crates directly rather than over a real HTTP socket.
