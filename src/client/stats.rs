use super::session::SessionReport;

/// Summary of a finished session. Formatting is the caller's business;
/// this module only computes.
#[derive(Debug, Clone, PartialEq)]
pub enum Summary {
	/// Nothing was ever sent, nothing to summarize.
	NoPacketsSent,
	/// Packets went out but no reply ever arrived.
	LossOnly { loss_rate: f64 },
	Full {
		loss_rate: f64,
		max_rtt: f64,
		min_rtt: f64,
		mean_rtt: f64,
		std_rtt: f64,
		/// Span between the first and last server-reported send times,
		/// not local clock.
		peer_time_span: f64,
	},
}

/// Pure function of the session's counters and samples.
///
/// All time-derived figures are scaled by ×1000, exactly as the protocol
/// has always reported them. This is a fixed scale factor, not a unit
/// conversion.
pub fn summarize(report: &SessionReport) -> Summary {
	if report.sent_count == 0 {
		return Summary::NoPacketsSent;
	}
	let loss_rate = 1.0 - report.received_count as f64 / report.sent_count as f64;
	if report.rtt_samples.is_empty() {
		return Summary::LossOnly { loss_rate };
	}

	let samples: Vec<f64> = report
		.rtt_samples
		.iter()
		.map(|d| d.as_secs_f64() * 1000.0)
		.collect();
	let max_rtt = samples.iter().cloned().fold(f64::MIN, f64::max);
	let min_rtt = samples.iter().cloned().fold(f64::MAX, f64::min);
	let mean_rtt = samples.iter().sum::<f64>() / samples.len() as f64;
	// population standard deviation
	let variance = samples
		.iter()
		.map(|s| (s - mean_rtt) * (s - mean_rtt))
		.sum::<f64>()
		/ samples.len() as f64;
	let std_rtt = variance.sqrt();
	let peer_time_span = match (report.first_peer_timestamp, report.last_peer_timestamp) {
		(Some(first), Some(last)) => (last - first) * 1000.0,
		_ => 0.0,
	};

	Summary::Full {
		loss_rate,
		max_rtt,
		min_rtt,
		mean_rtt,
		std_rtt,
		peer_time_span,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::time::Duration;

	fn report(
		sent_count: u64,
		received_count: u64,
		rtt_millis: &[u64],
		timestamps: Option<(f64, f64)>,
	) -> SessionReport {
		SessionReport {
			sent_count,
			received_count,
			rtt_samples: rtt_millis.iter().map(|&ms| Duration::from_millis(ms)).collect(),
			first_peer_timestamp: timestamps.map(|(first, _)| first),
			last_peer_timestamp: timestamps.map(|(_, last)| last),
		}
	}

	#[test]
	fn test_nothing_sent() {
		assert_eq!(summarize(&report(0, 0, &[], None)), Summary::NoPacketsSent);
	}

	#[test]
	fn test_loss_only_when_no_replies() {
		match summarize(&report(4, 0, &[], None)) {
			Summary::LossOnly { loss_rate } => assert_eq!(loss_rate, 1.0),
			other => panic!("unexpected summary: {:?}", other),
		}
	}

	#[test]
	fn test_loss_rate_identity() {
		match summarize(&report(8, 6, &[10, 20], Some((0.0, 0.0)))) {
			Summary::Full { loss_rate, .. } => assert_eq!(loss_rate, 1.0 - 6.0 / 8.0),
			other => panic!("unexpected summary: {:?}", other),
		}
	}

	#[test]
	fn test_rtt_figures() {
		// 10 ms and 30 ms: population σ is exactly 10 in the scaled domain
		match summarize(&report(2, 2, &[10, 30], Some((0.0, 0.0)))) {
			Summary::Full {
				max_rtt,
				min_rtt,
				mean_rtt,
				std_rtt,
				..
			} => {
				assert_eq!(max_rtt, 30.0);
				assert_eq!(min_rtt, 10.0);
				assert_eq!(mean_rtt, 20.0);
				assert_eq!(std_rtt, 10.0);
			}
			other => panic!("unexpected summary: {:?}", other),
		}
	}

	#[test]
	fn test_times_are_scaled_by_a_fixed_thousand() {
		match summarize(&report(1, 1, &[1500], Some((0.0, 0.0)))) {
			Summary::Full { max_rtt, .. } => assert_eq!(max_rtt, 1500.0),
			other => panic!("unexpected summary: {:?}", other),
		}
	}

	#[test]
	fn test_peer_time_span() {
		match summarize(&report(3, 3, &[10, 10, 10], Some((1000.25, 1002.75)))) {
			Summary::Full { peer_time_span, .. } => assert_eq!(peer_time_span, 2500.0),
			other => panic!("unexpected summary: {:?}", other),
		}
	}

	#[test]
	fn test_single_sample_has_zero_deviation_and_span() {
		match summarize(&report(1, 1, &[20], Some((500.0, 500.0)))) {
			Summary::Full {
				std_rtt,
				peer_time_span,
				..
			} => {
				assert_eq!(std_rtt, 0.0);
				assert_eq!(peer_time_span, 0.0);
			}
			other => panic!("unexpected summary: {:?}", other),
		}
	}
}
