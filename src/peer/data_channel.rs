use crate::logger::dump_payload;
use crate::peer::connection::{notify, ObserverSlot};
use crate::transport::TransportHandle;
use std::sync::Arc;
use tracing::{debug, info};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;

/// общий обработчик data-channel
pub(crate) fn attach_dc(handle: TransportHandle, dc: &Arc<RTCDataChannel>, observer: ObserverSlot) {
    info!(%handle, "Data channel {:?} attached", dc.label());

    dc.on_open(Box::new(move || {
        info!(%handle, "Data channel opened");
        Box::pin(async {})
    }));

    dc.on_close(Box::new(move || {
        info!(%handle, "Data channel closed");
        Box::pin(async {})
    }));

    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        debug!(%handle, "Received message, length: {}", msg.data.len());
        dump_payload("DC", &msg.data);
        notify(&observer, |o| o.on_data_received(msg.data));
        Box::pin(async {})
    }));
}
