//! Notification message body builder.
//!
//! Markdown summaries rendered for the robot channels. The exact layout
//! is operator-facing and not protocol-relevant.

use bridge_types::{NotifyChannel, Order, Shop};

/// Renders the new-order summary.
pub fn build_order_message(order: &Order, shop: &Shop) -> String {
	format!(
		"### 📦 新订单通知\n\n\
		**订单号：** {}\n\n\
		**店铺：** {}\n\n\
		**商品：** {}\n\n\
		**金额：** ¥{:.2}\n\n\
		**数量：** {}\n\n\
		**充值账号：** {}\n\n\
		**创建时间：** {}\n\n\
		> 请及时处理订单",
		order.jd_order_no,
		shop.shop_name,
		order.product_info.as_deref().unwrap_or("-"),
		order.amount as f64 / 100.0,
		order.quantity,
		order.produce_account.as_deref().unwrap_or("-"),
		order.create_time.format("%Y-%m-%d %H:%M:%S"),
	)
}

/// Renders the configuration test message.
pub fn build_test_message(shop: &Shop, channel: NotifyChannel) -> String {
	let channel_name = match channel {
		NotifyChannel::Dingtalk => "钉钉",
		NotifyChannel::Wecom => "企业微信",
	};
	format!(
		"### 🔔 测试通知\n\n\
		**店铺：** {}\n\n\
		**类型：** {}\n\n\
		> 这是一条测试通知，收到此消息说明配置正确",
		shop.shop_name, channel_name,
	)
}
