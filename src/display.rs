//! Operator-facing rendering of offers and launch results.

use std::io::{self, Write};

use crate::marketplace::Offer;

/// Converts megabytes (as reported by the marketplace) to gigabytes.
#[must_use]
#[expect(
    clippy::float_arithmetic,
    reason = "unit conversion of provider-reported floating point figures"
)]
pub fn megabytes_to_gigabytes(megabytes: f64) -> f64 {
    megabytes / 1024.0
}

/// Converts kilobits per second to megabytes per second.
#[must_use]
#[expect(
    clippy::float_arithmetic,
    reason = "unit conversion of provider-reported floating point figures"
)]
pub fn kilobits_to_megabytes_per_second(kilobits: f64) -> f64 {
    kilobits * 0.125
}

/// Formats a memory figure reported in MB as GB with two decimals.
#[must_use]
pub fn format_gigabytes(megabytes: f64) -> String {
    format!("{:.2}", megabytes_to_gigabytes(megabytes))
}

/// Formats a bandwidth figure reported in Kbit/s as MB/s with one decimal.
#[must_use]
pub fn format_bandwidth(kilobits: f64) -> String {
    format!("{:.1}", kilobits_to_megabytes_per_second(kilobits))
}

/// Writes the fixed-layout summary of `offer`, the `position`-th (0-based) of
/// `total` candidates.
///
/// # Errors
///
/// Propagates write failures on `out`.
pub fn render_offer(
    out: &mut impl Write,
    offer: &Offer,
    position: usize,
    total: usize,
) -> io::Result<()> {
    let id = offer
        .id
        .map_or_else(|| String::from("N/A"), |id| id.to_string());
    let text = |value: Option<&String>| value.map_or("N/A", String::as_str).to_owned();

    writeln!(out)?;
    writeln!(
        out,
        "Offer {} of {total} (ID {id}), ranked by price:",
        position.saturating_add(1)
    )?;
    writeln!(
        out,
        "   GPU: {} x{}",
        text(offer.gpu_name.as_ref()),
        offer.num_gpus
    )?;
    writeln!(out, "   VRAM (GB): {}", format_gigabytes(offer.gpu_ram))?;
    writeln!(out, "   DPH Total: {:.4} USD", offer.dph_total)?;
    writeln!(out, "   CPU: {}", text(offer.cpu_name.as_ref()))?;
    writeln!(out, "   CPU RAM (GB): {}", format_gigabytes(offer.cpu_ram))?;
    writeln!(out, "   Disk Storage (GB): {:.2}", offer.disk_space)?;
    writeln!(out, "   Reliability: {:.4}", offer.reliability)?;
    writeln!(out, "   DLPerf: {:.2}", offer.dlperf)?;
    writeln!(out, "   Max CUDA: {:.1}", offer.cuda_max_good)?;
    writeln!(out, "   Location: {}", text(offer.geolocation.as_ref()))?;
    writeln!(
        out,
        "   Network (MB/s): up {} / down {}",
        format_bandwidth(offer.inet_up),
        format_bandwidth(offer.inet_down)
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(16384.0, "16.00")]
    #[case(12288.0, "12.00")]
    #[case(1536.0, "1.50")]
    fn memory_is_shown_in_gigabytes(#[case] megabytes: f64, #[case] expected: &str) {
        assert_eq!(format_gigabytes(megabytes), expected);
    }

    #[rstest]
    #[case(800.0, "100.0")]
    #[case(0.0, "0.0")]
    #[case(4.0, "0.5")]
    fn bandwidth_is_shown_in_megabytes_per_second(#[case] kilobits: f64, #[case] expected: &str) {
        assert_eq!(format_bandwidth(kilobits), expected);
    }

    #[rstest]
    fn offer_summary_uses_human_units() {
        let offer = Offer {
            id: Some(123),
            gpu_name: Some(String::from("RTX_3060")),
            num_gpus: 1,
            gpu_ram: 12288.0,
            cpu_ram: 16384.0,
            dph_total: 0.0912,
            inet_down: 800.0,
            ..Offer::default()
        };
        let mut buf = Vec::new();

        render_offer(&mut buf, &offer, 0, 3).expect("render to memory");
        let rendered = String::from_utf8(buf).expect("utf8");

        assert!(rendered.contains("Offer 1 of 3 (ID 123)"), "{rendered}");
        assert!(rendered.contains("CPU RAM (GB): 16.00"), "{rendered}");
        assert!(rendered.contains("VRAM (GB): 12.00"), "{rendered}");
        assert!(rendered.contains("DPH Total: 0.0912 USD"), "{rendered}");
        assert!(rendered.contains("down 100.0"), "{rendered}");
        assert!(rendered.contains("Location: N/A"), "{rendered}");
    }
}
