//! Safe wrappers for FFmpeg operations that ffmpeg-next does not expose, or
//! exposes incorrectly. Everything unsafe in the library lives here or in
//! the encoder's parameter export.

use ffmpeg_next as ffmpeg;

use ffmpeg::ChannelLayout;

/// Read the sample rate from codec parameters.
///
/// ffmpeg-next has no accessor for audio fields on `Parameters`, so this
/// reaches into the raw struct.
pub fn codec_params_sample_rate(params: &ffmpeg::codec::Parameters) -> u32 {
    // SAFETY: params wraps a valid AVCodecParameters allocation and
    // sample_rate is a plain int field.
    unsafe { (*params.as_ptr()).sample_rate.max(0) as u32 }
}

/// Read the channel count from codec parameters.
pub fn codec_params_channels(params: &ffmpeg::codec::Parameters) -> u16 {
    // SAFETY: same as codec_params_sample_rate; ch_layout is owned by the
    // parameters struct.
    unsafe { (*params.as_ptr()).ch_layout.nb_channels.max(0) as u16 }
}

/// Read the declared bit rate from codec parameters. Zero when the
/// container does not record one.
pub fn codec_params_bit_rate(params: &ffmpeg::codec::Parameters) -> u64 {
    // SAFETY: plain field read, see codec_params_sample_rate.
    unsafe { (*params.as_ptr()).bit_rate.max(0) as u64 }
}

/// Clear the codec tag on an output stream so the muxer picks its own.
/// Must be called after `set_parameters` and before `write_header`; a tag
/// copied from the source container can make the target muxer reject the
/// stream.
pub fn stream_reset_codec_tag(out_stream: &mut ffmpeg::StreamMut) {
    // SAFETY: the stream and its codecpar are owned by the output context,
    // which outlives this exclusive borrow. codec_tag is a plain field.
    unsafe {
        (*(*out_stream.as_mut_ptr()).codecpar).codec_tag = 0;
    }
}

/// Export codec parameters from an opened encoder, for stamping onto an
/// output stream.
pub fn encoder_codec_parameters(encoder: &ffmpeg::codec::encoder::Audio) -> ffmpeg::codec::Parameters {
    // SAFETY: avcodec_parameters_alloc returns a zeroed allocation that
    // Parameters::wrap takes ownership of; avcodec_parameters_from_context
    // only reads the encoder context.
    unsafe {
        let params = ffmpeg::ffi::avcodec_parameters_alloc();
        ffmpeg::ffi::avcodec_parameters_from_context(params, encoder.as_ptr());
        ffmpeg::codec::Parameters::wrap(params, None::<std::rc::Rc<dyn std::any::Any>>)
    }
}

/// Reinterpret a raw s16 plane as i16 samples.
pub fn s16_plane_as_i16(plane: &[u8]) -> &[i16] {
    assert!(
        plane.len().is_multiple_of(std::mem::size_of::<i16>()),
        "plane length not a multiple of sample size"
    );
    assert!(
        (plane.as_ptr() as usize).is_multiple_of(std::mem::align_of::<i16>()),
        "plane pointer not aligned for i16"
    );
    // SAFETY: length and alignment checked above; FFmpeg allocates audio
    // planes with at least 32-byte alignment.
    unsafe { std::slice::from_raw_parts(plane.as_ptr().cast::<i16>(), plane.len() / 2) }
}

/// Mutable variant of [`s16_plane_as_i16`].
pub fn s16_plane_as_i16_mut(plane: &mut [u8]) -> &mut [i16] {
    assert!(
        plane.len().is_multiple_of(std::mem::size_of::<i16>()),
        "plane length not a multiple of sample size"
    );
    assert!(
        (plane.as_ptr() as usize).is_multiple_of(std::mem::align_of::<i16>()),
        "plane pointer not aligned for i16"
    );
    // SAFETY: see s16_plane_as_i16; the borrow is exclusive.
    unsafe { std::slice::from_raw_parts_mut(plane.as_mut_ptr().cast::<i16>(), plane.len() / 2) }
}

/// Get the raw bytes of one audio plane.
///
/// ffmpeg-next's `frame.data(index)` sizes the slice from
/// `linesize[index]`, but FFmpeg only fills `linesize[0]` for planar
/// audio, so every plane past the first comes back empty. Index through
/// `extended_data` with the shared plane size instead.
pub fn audio_plane_data(frame: &ffmpeg::frame::Audio, index: usize) -> &[u8] {
    if index >= frame.planes() {
        return &[];
    }
    // SAFETY: index is within the plane count, so extended_data[index] is a
    // valid pointer to a buffer of linesize[0] bytes owned by the frame.
    unsafe {
        let raw = frame.as_ptr();
        let size = (*raw).linesize[0].max(0) as usize;
        let ptr = *(*raw).extended_data.add(index);
        if ptr.is_null() {
            return &[];
        }
        std::slice::from_raw_parts(ptr, size)
    }
}

/// Mutable variant of [`audio_plane_data`].
pub fn audio_plane_data_mut(frame: &mut ffmpeg::frame::Audio, index: usize) -> &mut [u8] {
    if index >= frame.planes() {
        return &mut [];
    }
    // SAFETY: see audio_plane_data; the frame borrow is exclusive so no
    // other slice aliases the plane.
    unsafe {
        let raw = frame.as_mut_ptr();
        let size = (*raw).linesize[0].max(0) as usize;
        let ptr = *(*raw).extended_data.add(index);
        if ptr.is_null() {
            return &mut [];
        }
        std::slice::from_raw_parts_mut(ptr, size)
    }
}

/// Default channel layout for a channel count. Single-channel sources map
/// to mono, everything else to stereo.
pub fn default_layout_for_channels(channels: u16) -> ChannelLayout {
    match channels {
        1 => ChannelLayout::MONO,
        _ => ChannelLayout::STEREO,
    }
}

/// Substitute a concrete channel layout when the stream reports none.
pub fn fallback_channel_layout(layout: ChannelLayout, channels: u16) -> ChannelLayout {
    if layout.bits() != 0 {
        return layout;
    }
    default_layout_for_channels(channels)
}

/// Descriptive name for a channel layout, for probe output and logs.
pub fn channel_layout_name(layout: ChannelLayout, channels: u16) -> String {
    let layout = fallback_channel_layout(layout, channels);
    if layout == ChannelLayout::MONO {
        "mono".to_string()
    } else if layout == ChannelLayout::STEREO {
        "stereo".to_string()
    } else {
        format!("{}ch", channels)
    }
}

/// Map a config-friendly codec name onto an FFmpeg codec id.
pub fn codec_id_from_name(name: &str) -> Option<ffmpeg::codec::Id> {
    match name.to_ascii_lowercase().as_str() {
        "mp3" => Some(ffmpeg::codec::Id::MP3),
        "aac" => Some(ffmpeg::codec::Id::AAC),
        "flac" => Some(ffmpeg::codec::Id::FLAC),
        "opus" => Some(ffmpeg::codec::Id::OPUS),
        "vorbis" => Some(ffmpeg::codec::Id::VORBIS),
        _ => None,
    }
}

/// Test-only helper to fabricate audio codec parameters without demuxing a
/// real file.
#[cfg(test)]
pub(crate) fn codec_params_set_for_test(
    params: &mut ffmpeg::codec::Parameters,
    codec_id: ffmpeg::codec::Id,
    sample_rate: u32,
    channels: u16,
) {
    // SAFETY: params owns its allocation; these are plain field stores
    // through an exclusive borrow.
    unsafe {
        let raw = params.as_mut_ptr();
        (*raw).codec_type = ffmpeg::ffi::AVMediaType::AVMEDIA_TYPE_AUDIO;
        (*raw).codec_id = codec_id.into();
        (*raw).sample_rate = sample_rate as i32;
        (*raw).ch_layout.nb_channels = channels as i32;
    }
}
