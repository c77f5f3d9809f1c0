//! C-array header emission.
//!
//! Emits the rendered clips as `int16_t` arrays for embedding in
//! firmware, with the macro set playback code expects. The emitted
//! arrays are mono; `STEREO_SAMPLES` is kept for the playback side,
//! which interleaves on copy.

use super::wav::sample_to_i16;
use std::fmt::Write;

const VALUES_PER_ROW: usize = 8;

/// Derives an include guard from a file name: alphanumerics uppercased,
/// everything else folded to underscores.
pub fn include_guard(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            }
            else {
                '_'
            }
        })
        .collect()
}

/// Serializes `clips` as a C header. All clips must share one length;
/// `silence_samples` is the mono length of the inter-clip silence.
///
/// # Panics
///
/// Panics if the clips have differing lengths.
#[must_use]
pub fn write_c_header(
    filename: &str,
    clips: &[Vec<f64>],
    sample_rate: u32,
    silence_samples: usize,
) -> String {
    let mono_samples = clips.first().map_or(0, Vec::len);
    assert!(clips.iter().all(|c| c.len() == mono_samples));

    let guard = include_guard(filename);
    let num_buffers = clips.len();
    let stereo_samples = mono_samples * 2;
    let stereo_silence = silence_samples * 2;

    let mut out = String::new();

    let _ = writeln!(out, "#ifndef {guard}");
    let _ = writeln!(out, "#define {guard}");
    out.push('\n');
    out.push_str("#include <stdint.h>\n\n");

    let _ = writeln!(out, "#define SAMPLE_RATE {sample_rate}");
    let _ = writeln!(out, "#define NUM_BUFFERS {num_buffers}");
    let _ = writeln!(out, "#define MONO_SAMPLES {mono_samples}");
    let _ = writeln!(out, "#define STEREO_SAMPLES {stereo_samples}");
    let _ = writeln!(out, "#define SILENCE_SAMPLES {stereo_silence}");
    out.push('\n');

    // mono data; stereo macros size the interleaved playback copies
    for (index, clip) in clips.iter().enumerate() {
        let _ = writeln!(
            out,
            "const int16_t buffer{}[MONO_SAMPLES] = {{",
            index + 1
        );
        emit_rows(&mut out, clip.iter().map(|&x| sample_to_i16(x)));
        out.push_str("};\n\n");
    }

    out.push_str("const int16_t silenceBuffer[SILENCE_SAMPLES] = {\n");
    emit_rows(&mut out, (0..stereo_silence).map(|_| 0));
    out.push_str("};\n\n");

    let _ = writeln!(
        out,
        "const int16_t* noiseBuffers[NUM_BUFFERS] = {{"
    );
    for index in 0..num_buffers {
        let comma = if index + 1 < num_buffers { "," } else { "" };
        let _ = writeln!(out, "    buffer{}{comma}", index + 1);
    }
    out.push_str("};\n\n");

    let _ = writeln!(out, "#endif  // {guard}");

    out
}

/// Emits six-character right-justified integers, eight per row, comma
/// separated, with a trailing comma on every row but the last.
fn emit_rows(out: &mut String, values: impl ExactSizeIterator<Item = i16>) {
    let total = values.len();

    for (index, value) in values.enumerate() {
        let _ = write!(out, "{value:6}");

        if index + 1 < total {
            out.push(',');
        }
        if (index + 1) % VALUES_PER_ROW == 0 || index + 1 == total {
            out.push('\n');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> String {
        let clips =
            vec![vec![0.5; 20], vec![-0.25; 20], vec![0.0; 20]];
        write_c_header("noise_buffers.h", &clips, 44_100, 10)
    }

    #[test]
    fn guard_is_derived_from_the_filename() {
        assert_eq!(include_guard("noise_buffers.h"), "NOISE_BUFFERS_H");
        assert_eq!(include_guard("My File-1.h"), "MY_FILE_1_H");

        let header = sample_header();
        assert!(header.starts_with("#ifndef NOISE_BUFFERS_H\n#define NOISE_BUFFERS_H\n"));
        assert!(header.ends_with("#endif  // NOISE_BUFFERS_H\n"));
    }

    #[test]
    fn macros_reflect_the_layout() {
        let header = sample_header();
        assert!(header.contains("#define SAMPLE_RATE 44100\n"));
        assert!(header.contains("#define NUM_BUFFERS 3\n"));
        assert!(header.contains("#define MONO_SAMPLES 20\n"));
        // stereo sizes are twice the emitted mono data
        assert!(header.contains("#define STEREO_SAMPLES 40\n"));
        assert!(header.contains("#define SILENCE_SAMPLES 20\n"));
    }

    #[test]
    fn rows_hold_eight_right_justified_values() {
        let header = sample_header();

        // 0.5 converts to 16384, right-justified to width six
        let first_row = " 16384, 16384, 16384, 16384, 16384, 16384, 16384, 16384,";
        assert!(header.contains(first_row));

        // the final row of a 20-value array has four values and no
        // trailing comma
        assert!(header.contains(" 16384, 16384, 16384, 16384\n};"));

        // all line endings are LF
        assert!(!header.contains('\r'));
    }

    #[test]
    fn pointer_table_lists_every_buffer() {
        let header = sample_header();
        let table_at = header.find("const int16_t* noiseBuffers[NUM_BUFFERS] = {").unwrap();
        let table = &header[table_at..];
        assert!(table.contains("    buffer1,\n"));
        assert!(table.contains("    buffer2,\n"));
        assert!(table.contains("    buffer3\n"));
    }

    #[test]
    fn silence_buffer_is_all_zeros() {
        let header = sample_header();
        let at = header.find("silenceBuffer").unwrap();
        let body_start = header[at..].find('{').unwrap() + at;
        let body_end = header[body_start..].find('}').unwrap() + body_start;
        let body = &header[body_start + 1..body_end];

        for token in body.split(',') {
            assert_eq!(token.trim(), "0");
        }
    }
}
