
mod buffers_regressions;
