use procfs::process::{LimitValue, Process, Stat};
use prometheus_client::{
    encoding::{DescriptorEncoder, EncodeMetric},
    metrics::{counter::ConstCounter, gauge::ConstGauge},
    registry::Unit,
};

use crate::ProcessCollector;

pub(crate) fn encode(
    collector: &ProcessCollector,
    mut encoder: DescriptorEncoder,
) -> Result<(), std::fmt::Error> {
    let proc = match Process::myself() {
        Ok(proc) => proc,
        Err(_) => {
            return Ok(());
        }
    };
    let stat = match proc.stat() {
        Ok(stat) => stat,
        Err(_) => {
            return Ok(());
        }
    };

    collector.handle_error_report(cpu_seconds_total(collector, &stat, &mut encoder))?;
    collector.handle_error_report(resident_memory_bytes(collector, &stat, &mut encoder))?;
    collector.handle_error_report(virtual_memory_bytes(collector, &stat, &mut encoder))?;
    collector.handle_error_report(virtual_memory_max_bytes(collector, &proc, &mut encoder))?;
    collector.handle_error_report(open_fds(collector, &proc, &mut encoder))?;
    collector.handle_error_report(max_fds(collector, &proc, &mut encoder))?;
    collector.handle_error_report(threads(collector, &stat, &mut encoder))?;
    collector.handle_error_report(start_time(collector, &stat, &mut encoder))?;

    Ok(())
}

/// Soft limit, falling back to the hard limit, with `0` meaning unlimited.
fn limit(soft: &LimitValue, hard: &LimitValue) -> u64 {
    match soft {
        LimitValue::Value(soft) => *soft,
        LimitValue::Unlimited => match hard {
            LimitValue::Unlimited => 0,
            LimitValue::Value(hard) => *hard,
        },
    }
}

fn cpu_seconds_total(
    collector: &ProcessCollector,
    stat: &Stat,
    encoder: &mut DescriptorEncoder,
) -> Result<(), std::fmt::Error> {
    let tps = procfs::ticks_per_second() as f64;
    let counter = ConstCounter::new((stat.utime + stat.stime) as f64 / tps);
    let metric_name = collector.name("process_cpu");
    let metric_encoder = encoder.encode_descriptor(
        &metric_name,
        "Total user and system CPU time spent in seconds.",
        Some(&Unit::Seconds),
        counter.metric_type(),
    )?;
    counter.encode(metric_encoder)
}

fn resident_memory_bytes(
    collector: &ProcessCollector,
    stat: &Stat,
    encoder: &mut DescriptorEncoder,
) -> Result<(), std::fmt::Error> {
    let gauge = ConstGauge::new((stat.rss * procfs::page_size()) as i64);
    let metric_name = collector.name("process_resident_memory");
    let metric_encoder = encoder.encode_descriptor(
        &metric_name,
        "Resident memory size in bytes.",
        Some(&Unit::Bytes),
        gauge.metric_type(),
    )?;
    gauge.encode(metric_encoder)
}

fn virtual_memory_bytes(
    collector: &ProcessCollector,
    stat: &Stat,
    encoder: &mut DescriptorEncoder,
) -> Result<(), std::fmt::Error> {
    let gauge = ConstGauge::new(stat.vsize as i64);
    let metric_name = collector.name("process_virtual_memory");
    let metric_encoder = encoder.encode_descriptor(
        &metric_name,
        "Virtual memory size in bytes.",
        Some(&Unit::Bytes),
        gauge.metric_type(),
    )?;
    gauge.encode(metric_encoder)
}

fn virtual_memory_max_bytes(
    collector: &ProcessCollector,
    proc: &Process,
    encoder: &mut DescriptorEncoder,
) -> Result<(), std::fmt::Error> {
    let limits = proc.limits().map_err(|_| std::fmt::Error)?;
    let address_space = &limits.max_address_space;
    let gauge = ConstGauge::new(limit(&address_space.soft_limit, &address_space.hard_limit) as i64);
    let metric_name = collector.name("process_virtual_memory_max");
    let metric_encoder = encoder.encode_descriptor(
        &metric_name,
        "Maximum amount of virtual memory available in bytes.",
        Some(&Unit::Bytes),
        gauge.metric_type(),
    )?;
    gauge.encode(metric_encoder)
}

fn open_fds(
    collector: &ProcessCollector,
    proc: &Process,
    encoder: &mut DescriptorEncoder,
) -> Result<(), std::fmt::Error> {
    let count = proc.fd_count().map_err(|_| std::fmt::Error)?;
    let gauge = ConstGauge::new(count as i64);
    let metric_name = collector.name("process_open_fds");
    let metric_encoder = encoder.encode_descriptor(
        &metric_name,
        "Number of open file descriptors.",
        None,
        gauge.metric_type(),
    )?;
    gauge.encode(metric_encoder)
}

fn max_fds(
    collector: &ProcessCollector,
    proc: &Process,
    encoder: &mut DescriptorEncoder,
) -> Result<(), std::fmt::Error> {
    let limits = proc.limits().map_err(|_| std::fmt::Error)?;
    let open_files = &limits.max_open_files;
    let gauge = ConstGauge::new(limit(&open_files.soft_limit, &open_files.hard_limit) as i64);
    let metric_name = collector.name("process_max_fds");
    let metric_encoder = encoder.encode_descriptor(
        &metric_name,
        "Maximum number of open file descriptors.",
        None,
        gauge.metric_type(),
    )?;
    gauge.encode(metric_encoder)
}

fn threads(
    collector: &ProcessCollector,
    stat: &Stat,
    encoder: &mut DescriptorEncoder,
) -> Result<(), std::fmt::Error> {
    let gauge = ConstGauge::new(stat.num_threads);
    let metric_name = collector.name("process_threads");
    let metric_encoder = encoder.encode_descriptor(
        &metric_name,
        "Number of OS threads in the process.",
        None,
        gauge.metric_type(),
    )?;
    gauge.encode(metric_encoder)
}

fn start_time(
    collector: &ProcessCollector,
    stat: &Stat,
    encoder: &mut DescriptorEncoder,
) -> Result<(), std::fmt::Error> {
    let boot_time = procfs::boot_time_secs().map_err(|_| std::fmt::Error)? as f64;
    let tps = procfs::ticks_per_second() as f64;
    let gauge = ConstGauge::new(boot_time + stat.starttime as f64 / tps);
    let metric_name = collector.name("process_start_time");
    let metric_encoder = encoder.encode_descriptor(
        &metric_name,
        "Start time of the process since unix epoch in seconds.",
        Some(&Unit::Seconds),
        gauge.metric_type(),
    )?;
    gauge.encode(metric_encoder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_prefers_soft_value() {
        assert_eq!(
            1024,
            limit(&LimitValue::Value(1024), &LimitValue::Value(4096))
        );
        assert_eq!(4096, limit(&LimitValue::Unlimited, &LimitValue::Value(4096)));
        assert_eq!(0, limit(&LimitValue::Unlimited, &LimitValue::Unlimited));
    }
}
