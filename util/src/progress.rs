use std::borrow::Cow;
use std::io::Stdout;
use std::time::Duration;

use pbr::ProgressBar;

/// Terminal progress over the assimilation cycles of one experiment.
pub struct CycleProgress {
  name: Cow<'static, str>,
  progress: ProgressBar<Stdout>,
}
impl CycleProgress {
  pub fn new(cycles: usize, name: Cow<'static, str>) -> CycleProgress {
    let mut p = ProgressBar::new(cycles as _);
    p.show_speed = true;
    p.show_percent = true;
    p.show_counter = true;
    p.show_time_left = true;

    let fps = Duration::new(1, 0) / 60;
    p.set_max_refresh_rate(Some(fps));

    let msg = format!("{}: ", name);
    p.message(&msg[..]);
    CycleProgress {
      name: name,
      progress: p,
    }
  }

  /// `note` is shown next to the bar until the next cycle completes.
  pub fn cycle_done(&mut self, note: &str) {
    let msg = format!("{} [{}]: ", self.name, note);
    self.progress.message(&msg[..]);
    self.progress.inc();
  }

  pub fn finish(mut self) {
    let msg = format!("{} done!\n", self.name);
    self.progress.finish_println(&msg);
    info!("{} finished", self.name);
  }
}
