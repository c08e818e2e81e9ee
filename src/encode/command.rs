/// Name of the encoded video inside the encoder namespace.
pub const OUTPUT_FILE_NAME: &str = "output.mp4";

/// The encode invocation run over the staged frames.
///
/// [`EncodeCommand::default`] is the fixed export template: one frame per second, the
/// `frame_%03d.png` input sequence, H.264 in yuv420p, overwrite, `output.mp4`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodeCommand {
    /// Input frames per second (`-framerate`).
    pub framerate: u32,
    /// printf-style input sequence (`-i`).
    pub input_pattern: String,
    /// Video codec (`-c:v`).
    pub video_codec: String,
    /// Output pixel format (`-pix_fmt`).
    pub pix_fmt: String,
    /// `-y` when true, `-n` otherwise.
    pub overwrite: bool,
    /// Output asset name.
    pub output: String,
}

impl Default for EncodeCommand {
    fn default() -> Self {
        Self {
            framerate: 1,
            input_pattern: "frame_%03d.png".to_owned(),
            video_codec: "libx264".to_owned(),
            pix_fmt: "yuv420p".to_owned(),
            overwrite: true,
            output: OUTPUT_FILE_NAME.to_owned(),
        }
    }
}

impl EncodeCommand {
    /// The engine argument list, without the program name.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-framerate".to_owned(),
            self.framerate.to_string(),
            "-i".to_owned(),
            self.input_pattern.clone(),
            "-c:v".to_owned(),
            self.video_codec.clone(),
            "-pix_fmt".to_owned(),
            self.pix_fmt.clone(),
        ];
        args.push(if self.overwrite { "-y" } else { "-n" }.to_owned());
        args.push(self.output.clone());
        args
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/command.rs"]
mod tests;
