mod process;

pub use process::PtyProcess;
