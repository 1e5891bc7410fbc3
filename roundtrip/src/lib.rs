//! Rust code generated at build time from `schema/*.colf` and
//! `limits/*.colf`. The modules are siblings so that cross-package
//! references through `super` resolve.

pub mod demo {
    include!(concat!(env!("OUT_DIR"), "/demo.rs"));
}

pub mod geo {
    include!(concat!(env!("OUT_DIR"), "/geo.rs"));
}

pub mod capped {
    include!(concat!(env!("OUT_DIR"), "/limits/capped.rs"));
}
