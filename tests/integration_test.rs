#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;
    use vdkmux::format::ts::writer::{pat_packet, pes_packets, pmt_packet};
    use vdkmux::format::ts::{STREAM_TYPE_AAC, STREAM_TYPE_H264, STREAM_TYPE_METADATA};
    use vdkmux::mp4::inspect;
    use vdkmux::{host, Segment, SegmentType, Transmuxer, TransmuxerEvent, TransmuxerOptions};

    const SPS: &[u8] = &[0x67, 0x42, 0xc0, 0x1e, 0xf4, 0x05, 0x01, 0xec, 0x80];
    const PPS: &[u8] = &[0x68, 0xce, 0x3c, 0x80];
    const VIDEO_PID: u16 = 0x100;
    const AUDIO_PID: u16 = 0x101;
    const FRAME_TICKS: u64 = 3000;

    fn adts_frame(payload: &[u8]) -> Vec<u8> {
        // AAC-LC stereo, 48kHz
        let length = payload.len() + 7;
        let mut frame = vec![
            0xFF,
            0xF1,
            0x4C,
            0x80 | ((length >> 11) as u8 & 0x03),
            (length >> 3) as u8,
            ((length as u8 & 0x07) << 5) | 0x1F,
            0xFC,
        ];
        frame.extend_from_slice(payload);
        frame
    }

    /// SEI NAL unit carrying CEA-608 field 1 byte pairs
    fn caption_sei(pairs: &[u16]) -> Vec<u8> {
        let mut payload = vec![181, 0x00, 0x31, b'G', b'A', b'9', b'4', 0x03, 0x40 | pairs.len() as u8, 0xff];
        for pair in pairs {
            payload.push(0xfc);
            payload.extend_from_slice(&pair.to_be_bytes());
        }
        payload.push(0xff);

        let mut nal = vec![0x06, 0x04, payload.len() as u8];
        nal.extend_from_slice(&payload);
        nal.push(0x80);
        nal
    }

    fn annex_b(units: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        for unit in units {
            out.extend_from_slice(&[0, 0, 0, 1]);
            out.extend_from_slice(unit);
        }
        out
    }

    struct Fixture {
        frames: usize,
        gop_length: usize,
        /// Frames before the first keyframe
        first_key_frame: usize,
        audio: bool,
        /// Ticks the audio runs ahead of the video
        audio_lead: u64,
        captions: Vec<(usize, Vec<u16>)>,
    }

    impl Fixture {
        fn video(frames: usize) -> Self {
            Self {
                frames,
                gop_length: 30,
                first_key_frame: 0,
                audio: false,
                audio_lead: 0,
                captions: Vec::new(),
            }
        }

        fn with_audio(mut self) -> Self {
            self.audio = true;
            self
        }

        fn caption_at(mut self, frame: usize, pairs: &[u16]) -> Self {
            self.captions.push((frame, pairs.to_vec()));
            self
        }

        fn build(&self) -> Vec<u8> {
            let mut streams = vec![(STREAM_TYPE_H264, VIDEO_PID)];
            if self.audio {
                streams.push((STREAM_TYPE_AAC, AUDIO_PID));
            }
            let mut ts = pat_packet(0x1000, 0);
            ts.extend(pmt_packet(0x1000, &streams, 0));

            let (mut video_cc, mut audio_cc) = (0u8, 0u8);
            for i in 0..self.frames {
                let key = i >= self.first_key_frame && (i - self.first_key_frame) % self.gop_length == 0;
                let mut units = vec![vec![0x09, 0xf0]];
                if key {
                    units.push(SPS.to_vec());
                    units.push(PPS.to_vec());
                }
                for (_, pairs) in self.captions.iter().filter(|(frame, _)| *frame == i) {
                    units.push(caption_sei(pairs));
                }
                units.push(if key { vec![0x65, 0x88, 0x84, 0x21] } else { vec![0x41, 0x9a, 0x02, 0x03] });

                let dts = 90_000 + FRAME_TICKS * i as u64;
                let packets = pes_packets(VIDEO_PID, 0xe0, Some(dts), Some(dts), &annex_b(&units), video_cc);
                video_cc = video_cc.wrapping_add(packets.len() as u8) & 0x0f;
                ts.extend(packets.concat());

                if self.audio {
                    let audio_dts = dts - self.audio_lead;
                    let packets = pes_packets(AUDIO_PID, 0xc0, Some(audio_dts), None, &adts_frame(&[0x21; 24]), audio_cc);
                    audio_cc = audio_cc.wrapping_add(packets.len() as u8) & 0x0f;
                    ts.extend(packets.concat());
                }
            }
            ts
        }
    }

    fn transmux(transmuxer: &mut Transmuxer, input: &[u8]) -> Vec<TransmuxerEvent> {
        transmuxer.push(input);
        transmuxer.flush();
        transmuxer.take_events()
    }

    fn segments(events: &[TransmuxerEvent]) -> Vec<&Segment> {
        events
            .iter()
            .filter_map(|e| match e {
                TransmuxerEvent::Data(segment) => Some(segment),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_transport_stream_to_fragmented_mp4() {
        let mut transmuxer = Transmuxer::new(TransmuxerOptions::default());
        let events = transmux(&mut transmuxer, &Fixture::video(60).with_audio().build());

        let segment = segments(&events)[0];
        assert_eq!(segment.segment_type, SegmentType::Combined);

        let init = segment.init_segment.as_ref().expect("first segment carries an init segment");
        assert_eq!(&init[4..8], b"ftyp");
        let timescales = inspect::timescales(init);
        assert_eq!(timescales.get(&256), Some(&90_000));
        assert_eq!(timescales.get(&257), Some(&48_000));

        // one audio fragment, then one video fragment per GOP
        assert_eq!(inspect::base_media_decode_times(&segment.boxes), vec![0, 0, 90_000]);
        let samples = inspect::samples(&segment.boxes).unwrap();
        assert_eq!(samples.iter().map(Vec::len).collect::<Vec<_>>(), vec![60, 30, 30]);
        assert!(samples[0].iter().all(|s| s.duration == 1024 && s.size == 24));
    }

    #[test]
    fn test_every_video_fragment_starts_with_a_keyframe() {
        let mut transmuxer = Transmuxer::new(TransmuxerOptions::default());
        let input = Fixture {
            gop_length: 12,
            ..Fixture::video(48)
        }
        .build();
        let events = transmux(&mut transmuxer, &input);

        let segment = segments(&events)[0];
        let fragments = inspect::samples(&segment.boxes).unwrap();
        assert_eq!(fragments.len(), 4);
        for fragment in &fragments {
            assert!(fragment[0].is_key_frame());
            assert!(fragment[1..].iter().all(|s| !s.is_key_frame()));
            assert!(fragment.iter().all(|s| s.duration == FRAME_TICKS as u32));
        }
    }

    #[test]
    fn test_audio_trimmed_to_video_starting_mid_gop() {
        let input = Fixture {
            first_key_frame: 10,
            audio_lead: 4000,
            ..Fixture::video(40).with_audio()
        }
        .build();
        let mut transmuxer = Transmuxer::new(TransmuxerOptions::default());
        let events = transmux(&mut transmuxer, &input);

        let segment = segments(&events)[0];
        let fragments = inspect::samples(&segment.boxes).unwrap();
        assert_eq!(fragments.len(), 2);

        // audio at 86000 and 89000 decodes before the video timeline starts
        let audio = &fragments[0];
        assert_eq!(audio.len(), 38);
        assert!(audio.iter().all(|s| s.size == 24));
        // the first kept frame is 2000 ticks into the timeline, on the 48kHz clock
        assert_eq!(inspect::base_media_decode_times(&segment.boxes), vec![1066, 0]);

        // the keyframe is pulled back over the ten frames before it
        let video = &fragments[1];
        assert_eq!(video.len(), 30);
        assert!(video[0].is_key_frame());
        assert_eq!(video[0].duration, 11 * FRAME_TICKS as u32);
        assert!(video[1..].iter().all(|s| !s.is_key_frame() && s.duration == FRAME_TICKS as u32));
    }

    #[test]
    fn test_metadata_only_stream_delivers_tags() {
        let mut body = vec![3];
        body.extend_from_slice(b"cue\0go");
        let mut frame = b"TXXX".to_vec();
        frame.extend_from_slice(&[0, 0, 0, body.len() as u8, 0, 0]);
        frame.extend_from_slice(&body);
        let mut tag = b"ID3\x03\x00\x00".to_vec();
        tag.extend_from_slice(&[0, 0, 0, frame.len() as u8]);
        tag.extend_from_slice(&frame);

        let mut input = pat_packet(0x1000, 0);
        input.extend(pmt_packet(0x1000, &[(STREAM_TYPE_METADATA, 0x102)], 0));
        input.extend(pes_packets(0x102, 0xbd, Some(180_000), None, &tag, 0).concat());

        let mut transmuxer = Transmuxer::new(TransmuxerOptions::default());
        let events = transmux(&mut transmuxer, &input);
        assert_eq!(events.last(), Some(&TransmuxerEvent::Done));

        let segment = segments(&events)[0];
        assert_eq!(segment.segment_type, SegmentType::Metadata);
        assert!(segment.boxes.is_empty());
        assert_eq!(segment.dispatch_type.as_deref(), Some("15"));
        assert_eq!(segment.metadata.len(), 1);
        assert_eq!(segment.metadata[0].frames[0].value.as_deref(), Some("go"));
        assert_eq!(segment.metadata[0].cue_time, Some(2.0));
    }

    #[test]
    fn test_next_segment_reuses_init_and_advances_sequence() {
        let mut transmuxer = Transmuxer::new(TransmuxerOptions::default());
        let input = Fixture::video(30).with_audio().build();
        let first = transmux(&mut transmuxer, &input);
        let second = transmux(&mut transmuxer, &input);

        let first = segments(&first)[0];
        let second = segments(&second)[0];
        assert!(second.init_segment.is_none());
        assert_eq!(
            inspect::sequence_number(&second.boxes),
            inspect::sequence_number(&first.boxes).map(|n| n + 1)
        );
    }

    #[test]
    fn test_captions_are_timed_against_the_segment() {
        let input = Fixture::video(30)
            .caption_at(0, &[0x1420, 0x6869, 0x142f])
            .caption_at(15, &[0x142c])
            .build();
        let mut transmuxer = Transmuxer::new(TransmuxerOptions::default());
        let events = transmux(&mut transmuxer, &input);

        let captions = &segments(&events)[0].captions;
        assert_eq!(captions.len(), 1);
        assert_eq!(captions[0].text, "hi");
        assert_eq!(captions[0].start_time, Some(0.0));
        assert_eq!(captions[0].end_time, Some(0.5));
    }

    #[test]
    fn test_raw_aac_with_id3_timestamp() {
        let owner = b"com.apple.streaming.transportStreamTimestamp";
        let mut body = owner.to_vec();
        body.push(0);
        body.extend_from_slice(&[0, 0, 0, 0]);
        body.extend_from_slice(&900_000u32.to_be_bytes());

        let mut frame = b"PRIV".to_vec();
        frame.extend_from_slice(&[0, 0, 0, body.len() as u8, 0, 0]);
        frame.extend_from_slice(&body);
        let mut input = b"ID3\x03\x00\x00".to_vec();
        input.extend_from_slice(&[0, 0, 0, frame.len() as u8]);
        input.extend_from_slice(&frame);
        for _ in 0..4 {
            input.extend(adts_frame(&[0x21; 24]));
        }

        let options = TransmuxerOptions {
            keep_original_timestamps: true,
            ..TransmuxerOptions::default()
        };
        let mut transmuxer = Transmuxer::new(options);
        let events = transmux(&mut transmuxer, &input);

        let segment = segments(&events)[0];
        assert_eq!(segment.segment_type, SegmentType::Audio);
        // ten seconds on the 48kHz clock
        assert_eq!(inspect::base_media_decode_time(&segment.boxes), Some(480_000));
        assert_eq!(inspect::samples(&segment.boxes).unwrap()[0].len(), 4);
        assert_eq!(segment.metadata.len(), 1);
        assert_eq!(segment.metadata[0].cue_time, Some(10.0));
    }

    #[test]
    fn test_hosted_reader_matches_direct_use() {
        let input = Fixture::video(30).with_audio().build();
        let reader = tokio_test::io::Builder::new().read(&input[..2000]).read(&input[2000..]).build();
        let hosted = tokio_test::block_on(host::transmux_reader(reader, TransmuxerOptions::default(), 1024)).unwrap();

        let mut transmuxer = Transmuxer::new(TransmuxerOptions::default());
        assert_eq!(hosted, transmux(&mut transmuxer, &input));
    }

    #[quickcheck]
    fn prop_chunking_does_not_change_output(cuts: Vec<u16>) -> bool {
        let input = Fixture::video(20).with_audio().build();
        let mut whole = Transmuxer::new(TransmuxerOptions::default());
        let expected = transmux(&mut whole, &input);

        let mut points: Vec<usize> = cuts.into_iter().map(|c| c as usize % input.len()).collect();
        points.sort_unstable();
        let mut chunked = Transmuxer::new(TransmuxerOptions::default());
        let mut start = 0;
        for point in points {
            chunked.push(&input[start..point]);
            start = point;
        }
        chunked.push(&input[start..]);
        chunked.flush();

        chunked.take_events() == expected
    }

    #[quickcheck]
    fn prop_reset_matches_fresh_instance(garbage: Vec<u8>) -> bool {
        let input = Fixture::video(10).with_audio().build();
        let mut reused = Transmuxer::new(TransmuxerOptions::default());
        reused.push(&garbage);
        reused.reset();
        reused.take_events();

        let mut fresh = Transmuxer::new(TransmuxerOptions::default());
        transmux(&mut reused, &input) == transmux(&mut fresh, &input)
    }
}
